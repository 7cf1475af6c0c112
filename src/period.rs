//! Calendar month values written as `YYYY-MM`.

use chrono::{Datelike, Months, NaiveDate, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid month '{0}', expected YYYY-MM")]
pub struct MonthParseError(pub String);

/// A calendar month. Internally the first day of that month.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Month(NaiveDate);

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Month)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Month(date.with_day(1).unwrap_or(date))
    }

    /// Month containing today's UTC date.
    pub fn current() -> Self {
        Self::from_date(Utc::now().date_naive())
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next().0.pred_opt().unwrap_or(self.0)
    }

    pub fn next(&self) -> Self {
        Month(self.0.checked_add_months(Months::new(1)).unwrap_or(self.0))
    }

    pub fn previous(&self) -> Self {
        Month(self.0.checked_sub_months(Months::new(1)).unwrap_or(self.0))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year() && date.month() == self.month()
    }

    /// The `count` months ending at `self`, oldest first.
    pub fn trailing(&self, count: usize) -> Vec<Month> {
        let mut months = Vec::with_capacity(count);
        let mut cursor = *self;
        for _ in 0..count {
            months.push(cursor);
            cursor = cursor.previous();
        }
        months.reverse();
        months
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for Month {
    type Err = MonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let err = || MonthParseError(s.to_string());
        let bytes = raw.as_bytes();
        if bytes.len() != 7 || bytes[4] != b'-' {
            return Err(err());
        }
        let (year, month) = (&raw[..4], &raw[5..]);
        if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let year: i32 = year.parse().map_err(|_| err())?;
        let month: u32 = month.parse().map_err(|_| err())?;
        Month::new(year, month).ok_or_else(err)
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("2025-01", 2025, 1)]
    #[case("1999-12", 1999, 12)]
    #[case(" 2024-02 ", 2024, 2)]
    fn parses_valid_months(#[case] raw: &str, #[case] year: i32, #[case] month: u32) {
        let parsed: Month = raw.parse().unwrap();
        assert_eq!(parsed.year(), year);
        assert_eq!(parsed.month(), month);
    }

    #[rstest]
    #[case("2025-13")]
    #[case("2025-00")]
    #[case("2025-1")]
    #[case("25-01")]
    #[case("2025/01")]
    #[case("abcd-ef")]
    #[case("")]
    fn rejects_malformed_months(#[case] raw: &str) {
        assert!(raw.parse::<Month>().is_err());
    }

    #[test]
    fn bounds_and_navigation() {
        let feb: Month = "2024-02".parse().unwrap();
        assert_eq!(feb.first_day(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(feb.next().to_string(), "2024-03");
        assert_eq!(feb.previous().to_string(), "2024-01");

        let jan: Month = "2025-01".parse().unwrap();
        assert_eq!(jan.previous().to_string(), "2024-12");
        assert!(jan.contains(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()));
        assert!(!jan.contains(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()));
    }

    #[test]
    fn trailing_window_is_oldest_first() {
        let until: Month = "2025-02".parse().unwrap();
        let window: Vec<String> = until.trailing(4).iter().map(|m| m.to_string()).collect();
        assert_eq!(window, vec!["2024-11", "2024-12", "2025-01", "2025-02"]);
        assert!(until.trailing(0).is_empty());
    }

    #[test]
    fn serde_uses_text_form() {
        let month: Month = serde_json::from_str("\"2025-03\"").unwrap();
        assert_eq!(serde_json::to_string(&month).unwrap(), "\"2025-03\"");
        assert!(serde_json::from_str::<Month>("\"2025-3\"").is_err());
    }
}
