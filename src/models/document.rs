use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::user::UserRole;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "document_status", rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
}

/// A reviewer's verdict on a pending document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Document has already been {0}")]
    AlreadyReviewed(&'static str),
    #[error("A rejection reason is required")]
    MissingReason,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Approved => "approved",
            DocumentStatus::Rejected => "rejected",
        }
    }

    /// Only pending documents can be reviewed; approved and rejected are final.
    pub fn apply(self, decision: &ReviewDecision) -> Result<DocumentStatus, TransitionError> {
        match self {
            DocumentStatus::Pending => match decision {
                ReviewDecision::Approve => Ok(DocumentStatus::Approved),
                ReviewDecision::Reject { reason } if reason.trim().is_empty() => {
                    Err(TransitionError::MissingReason)
                }
                ReviewDecision::Reject { .. } => Ok(DocumentStatus::Rejected),
            },
            reviewed => Err(TransitionError::AlreadyReviewed(reviewed.as_str())),
        }
    }
}

impl ReviewDecision {
    pub fn target(&self) -> DocumentStatus {
        match self {
            ReviewDecision::Approve => DocumentStatus::Approved,
            ReviewDecision::Reject { .. } => DocumentStatus::Rejected,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ReviewDecision::Approve => None,
            ReviewDecision::Reject { reason } => Some(reason.trim()),
        }
    }
}

/// Admins review everything; reception reviews the credentials of the
/// parents and teachers it onboards.
pub fn can_review(reviewer: UserRole, owner: UserRole) -> bool {
    match reviewer {
        UserRole::Admin => true,
        UserRole::Reception => owner.is_onboarded_by_reception(),
        UserRole::Parent | UserRole::Teacher => false,
    }
}

/// Roles whose documents a reviewer sees in its queue.
pub fn reviewable_owner_roles(reviewer: UserRole) -> Vec<UserRole> {
    UserRole::ALL
        .into_iter()
        .filter(|owner| can_review(reviewer, *owner))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub doc_type: String,
    pub original_filename: String,
    #[serde(skip_serializing)]
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub status: DocumentStatus,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Review-queue row: the document plus who owns it.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DocumentWithOwner {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub owner_email: String,
    pub owner_role: UserRole,
    pub title: String,
    pub doc_type: String,
    pub original_filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub status: DocumentStatus,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentQuery {
    pub status: Option<DocumentStatus>,
    pub owner_id: Option<Uuid>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RejectDocumentRequest {
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_can_be_approved_or_rejected() {
        assert_eq!(
            DocumentStatus::Pending.apply(&ReviewDecision::Approve),
            Ok(DocumentStatus::Approved)
        );
        let reject = ReviewDecision::Reject { reason: "Blurry scan".into() };
        assert_eq!(DocumentStatus::Pending.apply(&reject), Ok(DocumentStatus::Rejected));
    }

    #[test]
    fn test_reviewed_documents_are_final() {
        let reject = ReviewDecision::Reject { reason: "Expired".into() };
        assert_eq!(
            DocumentStatus::Approved.apply(&reject),
            Err(TransitionError::AlreadyReviewed("approved"))
        );
        assert_eq!(
            DocumentStatus::Rejected.apply(&ReviewDecision::Approve),
            Err(TransitionError::AlreadyReviewed("rejected"))
        );
    }

    #[test]
    fn test_rejection_needs_reason() {
        let reject = ReviewDecision::Reject { reason: "   ".into() };
        assert_eq!(DocumentStatus::Pending.apply(&reject), Err(TransitionError::MissingReason));
    }

    #[test]
    fn test_review_authority() {
        assert!(can_review(UserRole::Admin, UserRole::Reception));
        assert!(can_review(UserRole::Admin, UserRole::Parent));
        assert!(can_review(UserRole::Reception, UserRole::Teacher));
        assert!(!can_review(UserRole::Reception, UserRole::Reception));
        assert!(!can_review(UserRole::Reception, UserRole::Admin));
        assert!(!can_review(UserRole::Teacher, UserRole::Parent));
        assert!(!can_review(UserRole::Parent, UserRole::Parent));
    }

    #[test]
    fn test_reviewable_owner_roles() {
        assert_eq!(
            reviewable_owner_roles(UserRole::Reception),
            vec![UserRole::Parent, UserRole::Teacher]
        );
        assert_eq!(reviewable_owner_roles(UserRole::Admin).len(), 4);
        assert!(reviewable_owner_roles(UserRole::Parent).is_empty());
    }

    #[test]
    fn test_status_query_deserializes() {
        let q: DocumentStatus = serde_json::from_str("\"rejected\"").unwrap();
        assert_eq!(q, DocumentStatus::Rejected);
    }
}
