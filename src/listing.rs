//! In-memory table controller shared by every list endpoint.
//!
//! A resource fetches its full dataset, then [`ListQuery::apply`] narrows it
//! by free-text search and dropdown filters, sorts it and slices one page.

use crate::errors::ServiceError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A sortable cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(Decimal),
    Date(NaiveDate),
    Bool(bool),
}

impl FieldValue {
    fn rank(&self) -> u8 {
        match self {
            FieldValue::Bool(_) => 0,
            FieldValue::Number(_) => 1,
            FieldValue::Date(_) => 2,
            FieldValue::Text(_) => 3,
        }
    }

    fn compare(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (FieldValue::Number(a), FieldValue::Number(b)) => a.cmp(b),
            (FieldValue::Date(a), FieldValue::Date(b)) => a.cmp(b),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Number(Decimal::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(Decimal::from(value))
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// A row that can be searched, filtered and sorted by the table controller.
pub trait Listable {
    /// Name used in error messages.
    const RESOURCE: &'static str;
    /// Filter keys this resource understands.
    const FILTERS: &'static [&'static str];
    /// Fields accepted by `sort_by`.
    const SORT_FIELDS: &'static [&'static str];

    /// String fields matched by the free-text search.
    fn search_fields(&self) -> Vec<Option<&str>>;

    /// Text form of a filter field; `None` when the row has no value.
    fn filter_value(&self, key: &str) -> Option<String>;

    fn sort_value(&self, field: &str) -> Option<FieldValue>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Query string accepted by list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub currency: Option<String>,
    pub department: Option<String>,
    pub cost_center_id: Option<i32>,
    pub is_active: Option<bool>,
    #[serde(alias = "period")]
    pub month: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<SortDirection>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// One page of a filtered, sorted list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

impl ListQuery {
    fn filters(&self) -> Vec<(&'static str, String)> {
        let mut filters = Vec::new();
        if let Some(status) = self.status.as_deref().filter(|s| !s.trim().is_empty()) {
            filters.push(("status", status.trim().to_string()));
        }
        if let Some(currency) = self.currency.as_deref().filter(|s| !s.trim().is_empty()) {
            filters.push(("currency", currency.trim().to_string()));
        }
        if let Some(department) = self.department.as_deref().filter(|s| !s.trim().is_empty()) {
            filters.push(("department", department.trim().to_string()));
        }
        if let Some(id) = self.cost_center_id {
            filters.push(("cost_center_id", id.to_string()));
        }
        if let Some(active) = self.is_active {
            filters.push(("is_active", active.to_string()));
        }
        if let Some(month) = self.month.as_deref().filter(|s| !s.trim().is_empty()) {
            filters.push(("month", month.trim().to_string()));
        }
        filters
    }

    /// Runs search, filters, sort and pagination over `rows`.
    pub fn apply<T: Listable>(&self, rows: Vec<T>) -> Result<Page<T>, ServiceError> {
        let filters = self.filters();
        if let Some((key, _)) = filters.iter().find(|(key, _)| !T::FILTERS.contains(key)) {
            return Err(ServiceError::ValidationError(format!(
                "Filter '{}' is not supported for {}",
                key,
                T::RESOURCE
            )));
        }

        let sort_field = match self.sort_by.as_deref().map(str::trim) {
            Some(field) if !field.is_empty() => {
                if !T::SORT_FIELDS.contains(&field) {
                    return Err(ServiceError::ValidationError(format!(
                        "Cannot sort {} by '{}'; expected one of: {}",
                        T::RESOURCE,
                        field,
                        T::SORT_FIELDS.join(", ")
                    )));
                }
                Some(field)
            }
            _ => None,
        };

        if self.page_size == Some(0) {
            return Err(ServiceError::ValidationError(
                "page_size must be at least 1".to_string(),
            ));
        }

        let needle = self
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut rows: Vec<T> = rows
            .into_iter()
            .filter(|row| match &needle {
                Some(needle) => row
                    .search_fields()
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(needle.as_str())),
                None => true,
            })
            .filter(|row| {
                filters.iter().all(|(key, wanted)| {
                    row.filter_value(key)
                        .map(|value| value.eq_ignore_ascii_case(wanted))
                        .unwrap_or(false)
                })
            })
            .collect();

        if let Some(field) = sort_field {
            let direction = self.sort_dir.unwrap_or_default();
            rows.sort_by(|a, b| {
                match (a.sort_value(field), b.sort_value(field)) {
                    (Some(x), Some(y)) => {
                        let ordering = x.compare(&y);
                        match direction {
                            SortDirection::Asc => ordering,
                            SortDirection::Desc => ordering.reverse(),
                        }
                    }
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            });
        }

        Ok(paginate(rows, self.page, self.page_size))
    }
}

fn paginate<T>(rows: Vec<T>, page: Option<u64>, page_size: Option<u64>) -> Page<T> {
    let total = rows.len() as u64;
    let page = page.unwrap_or(1).max(1);

    let Some(page_size) = page_size else {
        return Page {
            items: rows,
            total,
            page: 1,
            page_size: total,
            total_pages: u64::from(total > 0),
        };
    };

    let total_pages = total.div_ceil(page_size);
    let start = (page - 1).saturating_mul(page_size);
    let items = rows
        .into_iter()
        .skip(usize::try_from(start).unwrap_or(usize::MAX))
        .take(usize::try_from(page_size).unwrap_or(usize::MAX))
        .collect();

    Page {
        items,
        total,
        page,
        page_size,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[derive(Debug, Clone)]
    struct Row {
        name: &'static str,
        status: &'static str,
        amount: Option<Decimal>,
    }

    impl Listable for Row {
        const RESOURCE: &'static str = "rows";
        const FILTERS: &'static [&'static str] = &["status"];
        const SORT_FIELDS: &'static [&'static str] = &["name", "amount"];

        fn search_fields(&self) -> Vec<Option<&str>> {
            vec![Some(self.name), Some(self.status)]
        }

        fn filter_value(&self, key: &str) -> Option<String> {
            match key {
                "status" => Some(self.status.to_string()),
                _ => None,
            }
        }

        fn sort_value(&self, field: &str) -> Option<FieldValue> {
            match field {
                "name" => Some(self.name.into()),
                "amount" => self.amount.map(FieldValue::from),
                _ => None,
            }
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { name: "beta", status: "pending", amount: Some(dec!(20)) },
            Row { name: "Alpha", status: "approved", amount: None },
            Row { name: "gamma", status: "pending", amount: Some(dec!(5)) },
            Row { name: "delta", status: "sent", amount: Some(dec!(20)) },
        ]
    }

    fn names(page: &Page<Row>) -> Vec<&'static str> {
        page.items.iter().map(|r| r.name).collect()
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let query = ListQuery { search: Some("ALP".into()), ..Default::default() };
        let page = query.apply(rows()).unwrap();
        assert_eq!(names(&page), vec!["Alpha"]);
    }

    #[test]
    fn filter_and_search_combine() {
        let query = ListQuery {
            search: Some("a".into()),
            status: Some("Pending".into()),
            ..Default::default()
        };
        let page = query.apply(rows()).unwrap();
        assert_eq!(names(&page), vec!["beta", "gamma"]);
    }

    #[test]
    fn strings_sort_case_folded() {
        let query = ListQuery { sort_by: Some("name".into()), ..Default::default() };
        let page = query.apply(rows()).unwrap();
        assert_eq!(names(&page), vec!["Alpha", "beta", "delta", "gamma"]);
    }

    #[test]
    fn missing_values_sort_last_in_both_directions() {
        let asc = ListQuery { sort_by: Some("amount".into()), ..Default::default() };
        assert_eq!(names(&asc.apply(rows()).unwrap()), vec!["gamma", "beta", "delta", "Alpha"]);

        let desc = ListQuery {
            sort_by: Some("amount".into()),
            sort_dir: Some(SortDirection::Desc),
            ..Default::default()
        };
        // equal amounts keep their fetched order
        assert_eq!(names(&desc.apply(rows()).unwrap()), vec!["beta", "delta", "gamma", "Alpha"]);
    }

    #[test]
    fn pages_slice_the_filtered_list() {
        let query = ListQuery { page: Some(2), page_size: Some(3), ..Default::default() };
        let page = query.apply(rows()).unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);
        assert_eq!(names(&page), vec!["delta"]);

        let beyond = ListQuery { page: Some(9), page_size: Some(3), ..Default::default() };
        assert!(beyond.apply(rows()).unwrap().items.is_empty());
    }

    #[test]
    fn no_page_size_returns_everything() {
        let page = ListQuery::default().apply(rows()).unwrap();
        assert_eq!(page.items.len(), 4);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 4);
        assert_eq!(page.total_pages, 1);

        let empty = ListQuery::default().apply(Vec::<Row>::new()).unwrap();
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn unknown_sort_field_or_filter_is_rejected() {
        let sort = ListQuery { sort_by: Some("color".into()), ..Default::default() };
        assert_matches!(sort.apply(rows()), Err(ServiceError::ValidationError(_)));

        let filter = ListQuery { department: Some("IT".into()), ..Default::default() };
        assert_matches!(filter.apply(rows()), Err(ServiceError::ValidationError(_)));

        let zero = ListQuery { page_size: Some(0), ..Default::default() };
        assert_matches!(zero.apply(rows()), Err(ServiceError::ValidationError(_)));
    }
}
