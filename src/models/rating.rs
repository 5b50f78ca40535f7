use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const MIN_STARS: i16 = 1;
pub const MAX_STARS: i16 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeacherRating {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub parent_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A rating as the teacher or an admin sees it, with the parent's name.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RatingWithParent {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub parent_id: Uuid,
    pub parent_name: String,
    pub rating: i16,
    pub comment: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TeacherRatingSummary {
    pub teacher_id: Uuid,
    pub teacher_name: String,
    pub ratings_count: i64,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct RateTeacherRequest {
    pub teacher_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
}

impl RateTeacherRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(MIN_STARS..=MAX_STARS).contains(&self.rating) {
            return Err("Rating must be between 1 and 5");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(rating: i16) -> RateTeacherRequest {
        RateTeacherRequest { teacher_id: Uuid::new_v4(), rating, comment: None }
    }

    #[test]
    fn test_rating_range() {
        assert!(req(1).validate().is_ok());
        assert!(req(5).validate().is_ok());
        assert!(req(0).validate().is_err());
        assert!(req(6).validate().is_err());
        assert!(req(-3).validate().is_err());
    }
}
