use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Activity {
    pub id: Uuid,
    pub child_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub activity_date: NaiveDate,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateActivityRequest {
    pub child_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub activity_date: NaiveDate,
}
