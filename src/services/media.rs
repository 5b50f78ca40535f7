use axum::extract::Multipart;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        auth::AuthenticatedUser,
        media::{is_allowed_media_type, Media},
        user::UserRole,
        DateRangeQuery,
    },
    services::{
        children::ChildService,
        encryption,
        metrics::{content_kind, MEDIA_UPLOADS_COUNTER},
        storage::{self, UploadForm},
    },
};

pub const MAX_MEDIA_BYTES: usize = 100 * 1024 * 1024;

pub struct MediaService;

impl MediaService {
    /// Multipart fields: `file`, `child_id`, optional `caption` and `taken_on` (YYYY-MM-DD).
    pub async fn upload(
        pool: &PgPool,
        teacher: &AuthenticatedUser,
        media_dir: &str,
        master_key: &[u8; 32],
        multipart: Multipart,
    ) -> ApiResult<Media> {
        let form = UploadForm::read(multipart)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid upload: {e}")))?;

        let child_id: Uuid = form
            .field("child_id")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| ApiError::bad_request("child_id is required"))?;
        let taken_on = match form.field("taken_on") {
            Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
                .map_err(|_| ApiError::bad_request("taken_on must be YYYY-MM-DD"))?,
            None => Utc::now().date_naive(),
        };
        let caption = form.field("caption").map(str::to_string);

        let file = form
            .file
            .as_ref()
            .ok_or_else(|| ApiError::bad_request("No file field in upload"))?;
        if file.bytes.is_empty() {
            return Err(ApiError::bad_request("Uploaded file is empty"));
        }
        if file.bytes.len() > MAX_MEDIA_BYTES {
            return Err(ApiError::bad_request("Media exceeds the 100 MB limit"));
        }
        if !is_allowed_media_type(&file.content_type) {
            return Err(ApiError::bad_request("Only images and videos are accepted"));
        }

        if !ChildService::is_teacher_of(pool, child_id, teacher.user_id).await? {
            return Err(ApiError::Forbidden);
        }

        let key = encryption::derive_scope_key(master_key, &child_scope(child_id))?;
        let storage_path =
            storage::store_encrypted(media_dir, "media", &file.filename, &file.bytes, &key).await?;

        let inserted = sqlx::query_as::<_, Media>(
            "INSERT INTO media
               (child_id, uploader_id, caption, original_filename, storage_path,
                content_type, size_bytes, taken_on)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(child_id)
        .bind(teacher.user_id)
        .bind(&caption)
        .bind(&file.filename)
        .bind(&storage_path)
        .bind(&file.content_type)
        .bind(file.bytes.len() as i64)
        .bind(taken_on)
        .fetch_one(pool)
        .await;

        let media = match inserted {
            Ok(m) => m,
            Err(e) => {
                storage::remove(media_dir, &storage_path).await;
                return Err(e.into());
            }
        };

        MEDIA_UPLOADS_COUNTER
            .with_label_values(&[content_kind(&media.content_type)])
            .inc();
        tracing::info!(media = %media.id, child = %child_id, "media uploaded");
        Ok(media)
    }

    pub async fn list_for_child(
        pool: &PgPool,
        child_id: Uuid,
        range: &DateRangeQuery,
    ) -> ApiResult<Vec<Media>> {
        range.validate().map_err(ApiError::bad_request)?;
        let media = sqlx::query_as::<_, Media>(
            "SELECT * FROM media
             WHERE child_id = $1
               AND ($2::date IS NULL OR taken_on >= $2)
               AND ($3::date IS NULL OR taken_on <= $3)
             ORDER BY taken_on DESC, created_at DESC",
        )
        .bind(child_id)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(pool)
        .await?;
        Ok(media)
    }

    /// Decrypted bytes for anyone allowed to view the child.
    pub async fn download(
        pool: &PgPool,
        viewer: &AuthenticatedUser,
        id: Uuid,
        media_dir: &str,
        master_key: &[u8; 32],
    ) -> ApiResult<(Media, Vec<u8>)> {
        let media = sqlx::query_as::<_, Media>("SELECT * FROM media WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(ApiError::NotFound("Media"))?;
        ChildService::ensure_can_view(pool, viewer, media.child_id).await?;

        let key = encryption::derive_scope_key(master_key, &child_scope(media.child_id))?;
        let bytes = storage::load_decrypted(media_dir, &media.storage_path, &key).await?;
        Ok((media, bytes))
    }

    /// Uploaders may delete their own media; admins may delete any.
    pub async fn delete(
        pool: &PgPool,
        user: &AuthenticatedUser,
        id: Uuid,
        media_dir: &str,
    ) -> ApiResult<()> {
        let storage_path: Option<String> = sqlx::query_scalar(
            "DELETE FROM media
             WHERE id = $1 AND (uploader_id = $2 OR $3)
             RETURNING storage_path",
        )
        .bind(id)
        .bind(user.user_id)
        .bind(user.role == UserRole::Admin)
        .fetch_optional(pool)
        .await?;

        let storage_path = storage_path.ok_or(ApiError::NotFound("Media"))?;
        storage::remove(media_dir, &storage_path).await;
        Ok(())
    }
}

fn child_scope(child_id: Uuid) -> String {
    format!("media:{child_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_scope_differs_from_document_scope() {
        let id = Uuid::new_v4();
        assert_eq!(child_scope(id), format!("media:{id}"));
        assert_ne!(child_scope(id), format!("document:{id}"));
    }
}
