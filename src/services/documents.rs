use axum::extract::Multipart;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        auth::AuthenticatedUser,
        document::{
            can_review, reviewable_owner_roles, Document, DocumentQuery, DocumentStatus,
            DocumentWithOwner, ReviewDecision, TransitionError,
        },
        user::UserRole,
        PaginationQuery,
    },
    services::{
        encryption,
        metrics::{DOCUMENT_REVIEWS_COUNTER, DOCUMENT_UPLOADS_COUNTER},
        storage::{self, UploadForm},
    },
};

/// Explicit column list for Document.
const DOC_COLS: &str = "d.id, d.owner_id, d.title, d.doc_type, d.original_filename, d.storage_path,
     d.content_type, d.size_bytes, d.status, d.rejection_reason, d.reviewed_by, d.reviewed_at,
     d.created_at, d.updated_at";

/// Upper bound for a single credential scan.
pub const MAX_DOCUMENT_BYTES: usize = 20 * 1024 * 1024;

pub struct DocumentService;

impl DocumentService {
    pub async fn upload(
        pool: &PgPool,
        owner: &AuthenticatedUser,
        media_dir: &str,
        master_key: &[u8; 32],
        multipart: Multipart,
    ) -> ApiResult<Document> {
        let form = UploadForm::read(multipart)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid upload: {e}")))?;
        let file = form
            .file
            .as_ref()
            .ok_or_else(|| ApiError::bad_request("No file field in upload"))?;
        if file.bytes.is_empty() {
            return Err(ApiError::bad_request("Uploaded file is empty"));
        }
        if file.bytes.len() > MAX_DOCUMENT_BYTES {
            return Err(ApiError::bad_request("Document exceeds the 20 MB limit"));
        }

        let title = form.field("title").unwrap_or(&file.filename).trim().to_string();
        let doc_type = form.field("doc_type").unwrap_or("other").trim().to_string();
        validate_metadata(&title, &doc_type, &file.content_type).map_err(ApiError::bad_request)?;

        let key = encryption::derive_scope_key(master_key, &owner_scope(owner.user_id))?;
        let storage_path =
            storage::store_encrypted(media_dir, "documents", &file.filename, &file.bytes, &key)
                .await?;

        let new_doc = NewDocument {
            title: &title,
            doc_type: &doc_type,
            original_filename: &file.filename,
            storage_path: &storage_path,
            content_type: &file.content_type,
            size_bytes: file.bytes.len() as i64,
        };
        let doc = match insert_pending(pool, owner.user_id, &new_doc).await {
            Ok(doc) => doc,
            Err(e) => {
                storage::remove(media_dir, &storage_path).await;
                return Err(e);
            }
        };

        DOCUMENT_UPLOADS_COUNTER.with_label_values(&[owner.role.as_str()]).inc();
        tracing::info!(document = %doc.id, owner = %owner.user_id, "document uploaded");
        Ok(doc)
    }

    pub async fn list_own(pool: &PgPool, owner_id: Uuid) -> ApiResult<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOC_COLS} FROM documents d WHERE d.owner_id = $1 ORDER BY d.created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(pool)
        .await?;
        Ok(docs)
    }

    /// Review queue for admin or reception, restricted to the owner roles the
    /// reviewer has authority over.
    pub async fn list_for_review(
        pool: &PgPool,
        reviewer: &AuthenticatedUser,
        query: &DocumentQuery,
    ) -> ApiResult<Vec<DocumentWithOwner>> {
        let roles = reviewable_owner_roles(reviewer.role);
        if roles.is_empty() {
            return Err(ApiError::Forbidden);
        }
        let page = PaginationQuery::new(query.page, query.per_page);

        let docs = sqlx::query_as::<_, DocumentWithOwner>(
            "SELECT d.id, d.owner_id, u.first_name || ' ' || u.last_name AS owner_name,
                    u.email AS owner_email, u.role AS owner_role,
                    d.title, d.doc_type, d.original_filename, d.content_type, d.size_bytes,
                    d.status, d.rejection_reason, d.reviewed_by, d.reviewed_at, d.created_at
             FROM documents d
             JOIN users u ON u.id = d.owner_id
             WHERE u.role = ANY($1)
               AND ($2::document_status IS NULL OR d.status = $2)
               AND ($3::uuid IS NULL OR d.owner_id = $3)
             ORDER BY d.created_at ASC
             LIMIT $4 OFFSET $5",
        )
        .bind(&roles)
        .bind(query.status)
        .bind(query.owner_id)
        .bind(page.per_page())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;
        Ok(docs)
    }

    /// Approve or reject a pending document. The conditional update makes the
    /// first decision stick when two reviewers act at once.
    pub async fn review(
        pool: &PgPool,
        reviewer: &AuthenticatedUser,
        doc_id: Uuid,
        decision: ReviewDecision,
    ) -> ApiResult<Document> {
        let row: Option<(DocumentStatus, Uuid, UserRole)> = sqlx::query_as(
            "SELECT d.status, d.owner_id, u.role
             FROM documents d JOIN users u ON u.id = d.owner_id
             WHERE d.id = $1",
        )
        .bind(doc_id)
        .fetch_optional(pool)
        .await?;
        let (status, owner_id, owner_role) = row.ok_or(ApiError::NotFound("Document"))?;

        if owner_id == reviewer.user_id || !can_review(reviewer.role, owner_role) {
            return Err(ApiError::Forbidden);
        }
        status.apply(&decision).map_err(transition_error)?;

        let mut tx = pool.begin().await?;
        lock_owner(&mut *tx, owner_id).await?;
        let doc = sqlx::query_as::<_, Document>(&format!(
            "UPDATE documents AS d
             SET status = $2, rejection_reason = $3, reviewed_by = $4,
                 reviewed_at = NOW(), updated_at = NOW()
             WHERE d.id = $1 AND d.status = 'pending'
             RETURNING {DOC_COLS}"
        ))
        .bind(doc_id)
        .bind(decision.target())
        .bind(decision.reason())
        .bind(reviewer.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::Conflict("Document has already been reviewed".into()))?;

        refresh_documents_approved(&mut *tx, owner_id).await?;
        tx.commit().await?;

        DOCUMENT_REVIEWS_COUNTER
            .with_label_values(&[reviewer.role.as_str(), doc.status.as_str()])
            .inc();
        tracing::info!(
            document = %doc.id,
            reviewer = %reviewer.user_id,
            status = doc.status.as_str(),
            "document reviewed"
        );
        Ok(doc)
    }

    /// Fetch a document and its decrypted bytes, for the owner or a reviewer with authority.
    pub async fn download(
        pool: &PgPool,
        viewer: &AuthenticatedUser,
        doc_id: Uuid,
        media_dir: &str,
        master_key: &[u8; 32],
    ) -> ApiResult<(Document, Vec<u8>)> {
        let row: Option<(UserRole,)> = sqlx::query_as(
            "SELECT u.role FROM documents d JOIN users u ON u.id = d.owner_id WHERE d.id = $1",
        )
        .bind(doc_id)
        .fetch_optional(pool)
        .await?;
        let (owner_role,) = row.ok_or(ApiError::NotFound("Document"))?;

        let doc = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOC_COLS} FROM documents d WHERE d.id = $1"
        ))
        .bind(doc_id)
        .fetch_one(pool)
        .await?;

        if doc.owner_id != viewer.user_id && !can_review(viewer.role, owner_role) {
            return Err(ApiError::Forbidden);
        }

        let key = encryption::derive_scope_key(master_key, &owner_scope(doc.owner_id))?;
        let bytes = storage::load_decrypted(media_dir, &doc.storage_path, &key).await?;
        Ok((doc, bytes))
    }

    /// Owners may withdraw a document only while it is still pending.
    pub async fn delete_own(
        pool: &PgPool,
        owner_id: Uuid,
        doc_id: Uuid,
        media_dir: &str,
    ) -> ApiResult<()> {
        let row: Option<(Uuid, DocumentStatus, String)> =
            sqlx::query_as("SELECT owner_id, status, storage_path FROM documents WHERE id = $1")
                .bind(doc_id)
                .fetch_optional(pool)
                .await?;
        let (doc_owner, status, storage_path) = row.ok_or(ApiError::NotFound("Document"))?;

        if doc_owner != owner_id {
            return Err(ApiError::NotFound("Document"));
        }
        if status != DocumentStatus::Pending {
            return Err(ApiError::Conflict("Reviewed documents cannot be deleted".into()));
        }

        let mut tx = pool.begin().await?;
        lock_owner(&mut *tx, owner_id).await?;
        let deleted = sqlx::query("DELETE FROM documents WHERE id = $1 AND status = 'pending'")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(ApiError::Conflict("Document has already been reviewed".into()));
        }
        refresh_documents_approved(&mut *tx, owner_id).await?;
        tx.commit().await?;

        storage::remove(media_dir, &storage_path).await;
        Ok(())
    }
}

/// Column limits from the `documents` table.
const MAX_TITLE_CHARS: usize = 255;
const MAX_DOC_TYPE_CHARS: usize = 64;
const MAX_CONTENT_TYPE_CHARS: usize = 128;

struct NewDocument<'a> {
    title: &'a str,
    doc_type: &'a str,
    original_filename: &'a str,
    storage_path: &'a str,
    content_type: &'a str,
    size_bytes: i64,
}

fn validate_metadata(title: &str, doc_type: &str, content_type: &str) -> Result<(), String> {
    if title.is_empty() {
        return Err("Document title is required".into());
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(format!("Title exceeds {MAX_TITLE_CHARS} characters"));
    }
    if doc_type.is_empty() || doc_type.chars().count() > MAX_DOC_TYPE_CHARS {
        return Err(format!("Document type must be 1 to {MAX_DOC_TYPE_CHARS} characters"));
    }
    if content_type.chars().count() > MAX_CONTENT_TYPE_CHARS {
        return Err("Unsupported content type".into());
    }
    Ok(())
}

/// Inserts a pending document and recomputes the owner's flag in one transaction.
async fn insert_pending(pool: &PgPool, owner_id: Uuid, new: &NewDocument<'_>) -> ApiResult<Document> {
    let mut tx = pool.begin().await?;
    lock_owner(&mut *tx, owner_id).await?;
    let doc = sqlx::query_as::<_, Document>(&format!(
        "INSERT INTO documents AS d
         (owner_id, title, doc_type, original_filename, storage_path, content_type, size_bytes)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {DOC_COLS}"
    ))
    .bind(owner_id)
    .bind(new.title)
    .bind(new.doc_type)
    .bind(new.original_filename)
    .bind(new.storage_path)
    .bind(new.content_type)
    .bind(new.size_bytes)
    .fetch_one(&mut *tx)
    .await?;
    refresh_documents_approved(&mut *tx, owner_id).await?;
    tx.commit().await?;
    Ok(doc)
}

/// Serializes document changes per owner. Every transaction that ends in
/// `refresh_documents_approved` takes this lock before touching `documents`,
/// so the recompute reads the other transactions' committed rows.
async fn lock_owner<'e, E: PgExecutor<'e>>(executor: E, owner_id: Uuid) -> ApiResult<()> {
    sqlx::query("SELECT 1 FROM users WHERE id = $1 FOR UPDATE")
        .bind(owner_id)
        .fetch_optional(executor)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(())
}

/// `documents_approved` holds iff the owner has at least one document and
/// every one of them is approved.
async fn refresh_documents_approved<'e, E: PgExecutor<'e>>(executor: E, owner_id: Uuid) -> ApiResult<()> {
    sqlx::query(
        "UPDATE users SET
            documents_approved = (
                EXISTS (SELECT 1 FROM documents WHERE owner_id = $1)
                AND NOT EXISTS (SELECT 1 FROM documents WHERE owner_id = $1 AND status <> 'approved')
            ),
            updated_at = NOW()
         WHERE id = $1",
    )
    .bind(owner_id)
    .execute(executor)
    .await?;
    Ok(())
}

fn owner_scope(owner_id: Uuid) -> String {
    format!("document:{owner_id}")
}

fn transition_error(e: TransitionError) -> ApiError {
    match e {
        TransitionError::AlreadyReviewed(_) => ApiError::Conflict(e.to_string()),
        TransitionError::MissingReason => ApiError::BadRequest(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use axum::http::StatusCode;

    #[test]
    fn test_transition_errors_map_to_http() {
        assert_eq!(
            transition_error(TransitionError::AlreadyReviewed("approved")).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            transition_error(TransitionError::MissingReason).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_owner_scope_is_per_user() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_ne!(owner_scope(a), owner_scope(b));
        assert!(owner_scope(a).starts_with("document:"));
    }

    #[test]
    fn test_validate_metadata_limits() {
        assert!(validate_metadata("Vaccination record", "health", "application/pdf").is_ok());
        assert!(validate_metadata("", "health", "application/pdf").is_err());
        assert!(validate_metadata(&"t".repeat(256), "health", "application/pdf").is_err());
        assert!(validate_metadata(&"é".repeat(255), "health", "application/pdf").is_ok());
        assert!(validate_metadata("Record", &"x".repeat(65), "application/pdf").is_err());
        assert!(validate_metadata("Record", "health", &"a".repeat(129)).is_err());
    }

    async fn pending(pool: &PgPool, owner_id: Uuid) -> Document {
        let new = NewDocument {
            title: "Birth certificate",
            doc_type: "identity",
            original_filename: "birth.pdf",
            storage_path: "documents/missing.pdf.enc",
            content_type: "application/pdf",
            size_bytes: 2048,
        };
        insert_pending(pool, owner_id, &new).await.unwrap()
    }

    async fn documents_approved(pool: &PgPool, user_id: Uuid) -> bool {
        sqlx::query_scalar("SELECT documents_approved FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn reject(reason: &str) -> ReviewDecision {
        ReviewDecision::Reject { reason: reason.into() }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_second_review_is_a_conflict(pool: PgPool) {
        let teacher = fixtures::user(&pool, UserRole::Teacher).await;
        let admin = fixtures::user(&pool, UserRole::Admin).await;
        let reception = fixtures::user(&pool, UserRole::Reception).await;
        let doc = pending(&pool, teacher.user_id).await;

        let approved = DocumentService::review(&pool, &admin, doc.id, ReviewDecision::Approve)
            .await
            .unwrap();
        assert_eq!(approved.status, DocumentStatus::Approved);
        assert_eq!(approved.reviewed_by, Some(admin.user_id));

        let err = DocumentService::review(&pool, &reception, doc.id, reject("blurry"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_reviewers_are_limited_by_owner_role(pool: PgPool) {
        let admin = fixtures::user(&pool, UserRole::Admin).await;
        let reception = fixtures::user(&pool, UserRole::Reception).await;
        let other_reception = fixtures::user(&pool, UserRole::Reception).await;
        let doc = pending(&pool, other_reception.user_id).await;

        let err = DocumentService::review(&pool, &reception, doc.id, ReviewDecision::Approve)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let own = pending(&pool, admin.user_id).await;
        let err = DocumentService::review(&pool, &admin, own.id, ReviewDecision::Approve)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_documents_approved_follows_uploads_and_reviews(pool: PgPool) {
        let parent = fixtures::user(&pool, UserRole::Parent).await;
        let admin = fixtures::user(&pool, UserRole::Admin).await;
        assert!(!documents_approved(&pool, parent.user_id).await);

        let a = pending(&pool, parent.user_id).await;
        let b = pending(&pool, parent.user_id).await;
        DocumentService::review(&pool, &admin, a.id, ReviewDecision::Approve).await.unwrap();
        assert!(!documents_approved(&pool, parent.user_id).await);

        DocumentService::review(&pool, &admin, b.id, ReviewDecision::Approve).await.unwrap();
        assert!(documents_approved(&pool, parent.user_id).await);

        let c = pending(&pool, parent.user_id).await;
        assert!(!documents_approved(&pool, parent.user_id).await);

        DocumentService::review(&pool, &admin, c.id, reject("expired")).await.unwrap();
        assert!(!documents_approved(&pool, parent.user_id).await);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_concurrent_approvals_leave_owner_approved(pool: PgPool) {
        let teacher = fixtures::user(&pool, UserRole::Teacher).await;
        let admin = fixtures::user(&pool, UserRole::Admin).await;
        let reception = fixtures::user(&pool, UserRole::Reception).await;
        let a = pending(&pool, teacher.user_id).await;
        let b = pending(&pool, teacher.user_id).await;

        let (ra, rb) = tokio::join!(
            DocumentService::review(&pool, &admin, a.id, ReviewDecision::Approve),
            DocumentService::review(&pool, &reception, b.id, ReviewDecision::Approve),
        );
        ra.unwrap();
        rb.unwrap();
        assert!(documents_approved(&pool, teacher.user_id).await);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_owner_deletes_only_pending(pool: PgPool) {
        let teacher = fixtures::user(&pool, UserRole::Teacher).await;
        let admin = fixtures::user(&pool, UserRole::Admin).await;
        let media_dir = std::env::temp_dir();
        let media_dir = media_dir.to_string_lossy();

        let approved = pending(&pool, teacher.user_id).await;
        DocumentService::review(&pool, &admin, approved.id, ReviewDecision::Approve).await.unwrap();
        let err = DocumentService::delete_own(&pool, teacher.user_id, approved.id, &media_dir)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let withdrawn = pending(&pool, teacher.user_id).await;
        let err = DocumentService::delete_own(&pool, admin.user_id, withdrawn.id, &media_dir)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        DocumentService::delete_own(&pool, teacher.user_id, withdrawn.id, &media_dir)
            .await
            .unwrap();
        assert!(documents_approved(&pool, teacher.user_id).await);
    }
}
