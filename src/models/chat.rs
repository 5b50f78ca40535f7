use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::user::UserRole;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub teacher_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.parent_id == user_id || self.teacher_id == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: UserRole,
    pub content: String,
    pub read_by_parent: bool,
    pub read_by_teacher: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub teacher_id: Uuid,
    pub other_name: String,
    pub last_message: Option<String>,
    pub last_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct OpenConversationRequest {
    /// The teacher (when called by a parent) or the parent (when called by a teacher).
    pub participant_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SendChatMessageRequest {
    pub content: String,
}

/// Envelope pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
}

/// Column holding the read flag for a role. Only chat participants have one.
pub fn read_flag_column(role: UserRole) -> Option<&'static str> {
    match role {
        UserRole::Parent => Some("read_by_parent"),
        UserRole::Teacher => Some("read_by_teacher"),
        UserRole::Reception | UserRole::Admin => None,
    }
}

/// Redis channel a user's WebSocket listens on.
pub fn user_channel(user_id: Uuid) -> String {
    format!("chat:user:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_flag_column() {
        assert_eq!(read_flag_column(UserRole::Parent), Some("read_by_parent"));
        assert_eq!(read_flag_column(UserRole::Teacher), Some("read_by_teacher"));
        assert_eq!(read_flag_column(UserRole::Admin), None);
    }

    #[test]
    fn test_participants() {
        let parent = Uuid::new_v4();
        let teacher = Uuid::new_v4();
        let conv = Conversation {
            id: Uuid::new_v4(),
            parent_id: parent,
            teacher_id: teacher,
            created_at: Utc::now(),
        };
        assert!(conv.has_participant(parent));
        assert!(!conv.has_participant(Uuid::new_v4()));
        assert!(conv.has_participant(teacher));
    }
}
