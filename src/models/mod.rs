pub mod activity;
pub mod auth;
pub mod chat;
pub mod child;
pub mod document;
pub mod group;
pub mod meal;
pub mod media;
pub mod rating;
pub mod statistics;
pub mod user;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

/// Highest page number honoured; later pages are empty anyway.
const MAX_PAGE: i64 = 10_000;

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PaginationQuery {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self { page, per_page }
    }

    pub fn offset(&self) -> i64 {
        let page = self.page.unwrap_or(1).clamp(1, MAX_PAGE);
        (page - 1) * self.per_page()
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(20).clamp(1, 100)
    }
}

/// For PATCH-style bodies: a missing field is `None`, an explicit `null` is
/// `Some(None)`. Pair with `#[serde(default)]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Optional inclusive date window for activity, meal and media listings.
#[derive(Debug, Default, Deserialize)]
pub struct DateRangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRangeQuery {
    pub fn validate(&self) -> Result<(), &'static str> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err("`from` must not be after `to`"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults_and_clamps() {
        let q = PaginationQuery::new(None, None);
        assert_eq!((q.offset(), q.per_page()), (0, 20));

        let q = PaginationQuery::new(Some(3), Some(10));
        assert_eq!(q.offset(), 20);

        let q = PaginationQuery::new(Some(0), Some(1000));
        assert_eq!((q.offset(), q.per_page()), (0, 100));
    }

    #[test]
    fn test_pagination_huge_page_does_not_overflow() {
        let q = PaginationQuery::new(Some(i64::MAX), Some(20));
        assert_eq!(q.offset(), (MAX_PAGE - 1) * 20);

        let q = PaginationQuery::new(Some(i64::MIN), Some(i64::MAX));
        assert_eq!(q.offset(), 0);
    }

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "nullable")]
        teacher_id: Option<Option<uuid::Uuid>>,
    }

    #[test]
    fn test_nullable_distinguishes_missing_from_null() {
        let missing: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.teacher_id, None);

        let cleared: Patch = serde_json::from_str(r#"{"teacher_id": null}"#).unwrap();
        assert_eq!(cleared.teacher_id, Some(None));

        let id = uuid::Uuid::new_v4();
        let set: Patch = serde_json::from_str(&format!(r#"{{"teacher_id": "{id}"}}"#)).unwrap();
        assert_eq!(set.teacher_id, Some(Some(id)));
    }

    #[test]
    fn test_date_range_validation() {
        let d = |day| NaiveDate::from_ymd_opt(2026, 9, day).unwrap();
        assert!(DateRangeQuery { from: Some(d(1)), to: Some(d(7)) }.validate().is_ok());
        assert!(DateRangeQuery { from: Some(d(8)), to: Some(d(7)) }.validate().is_err());
        assert!(DateRangeQuery::default().validate().is_ok());
    }
}
