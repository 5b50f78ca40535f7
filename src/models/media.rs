use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Media {
    pub id: Uuid,
    pub child_id: Uuid,
    pub uploader_id: Uuid,
    pub caption: Option<String>,
    pub original_filename: String,
    #[serde(skip_serializing)]
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub taken_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Accepted upload types for child media.
pub fn is_allowed_media_type(content_type: &str) -> bool {
    content_type.starts_with("image/") || content_type.starts_with("video/")
}
