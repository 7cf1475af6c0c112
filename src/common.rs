/// Common types and utilities shared across handlers and services
use crate::errors::ServiceError;
use crate::period::Month;
use serde::{Deserialize, Deserializer};

/// Deserializes optional text, mapping blank strings to `None`.
///
/// Browser forms send `""` for untouched inputs.
pub fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

/// Parses a `YYYY-MM` query or body value.
pub fn parse_month(field: &str, raw: &str) -> Result<Month, ServiceError> {
    raw.parse::<Month>()
        .map_err(|_| ServiceError::ValidationError(format!("{} must use the YYYY-MM format", field)))
}

/// Parses an optional month, falling back to the current one.
pub fn month_or_current(field: &str, raw: Option<&str>) -> Result<Month, ServiceError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_month(field, raw),
        None => Ok(Month::current()),
    }
}

/// Utilization percentage; zero when nothing was budgeted.
pub fn utilization(spent: rust_decimal::Decimal, budget: rust_decimal::Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    if budget.is_zero() {
        return 0.0;
    }
    (spent / budget * rust_decimal::Decimal::ONE_HUNDRED)
        .to_f64()
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Form {
        #[serde(default, deserialize_with = "empty_string_as_none")]
        email: Option<String>,
    }

    #[test]
    fn blank_strings_become_none() {
        let form: Form = serde_json::from_str(r#"{"email":"   "}"#).unwrap();
        assert!(form.email.is_none());
        let form: Form = serde_json::from_str(r#"{"email":" a@b.cl "}"#).unwrap();
        assert_eq!(form.email.as_deref(), Some("a@b.cl"));
        let form: Form = serde_json::from_str("{}").unwrap();
        assert!(form.email.is_none());
    }

    #[test]
    fn month_parsing_reports_field() {
        let err = parse_month("target_month", "2025-1").unwrap_err();
        assert!(err.to_string().contains("target_month"));
        assert!(month_or_current("month", Some("")).is_ok());
    }

    #[test]
    fn utilization_is_zero_without_budget() {
        assert_eq!(utilization(dec!(500), dec!(0)), 0.0);
        assert_eq!(utilization(dec!(6500000), dec!(8000000)), 81.25);
    }
}
