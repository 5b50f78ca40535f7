use redis::{aio::MultiplexedConnection, AsyncCommands};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        auth::AuthenticatedUser,
        chat::{read_flag_column, user_channel, ChatMessage, Conversation, ConversationSummary, WsMessage},
        user::UserRole,
        PaginationQuery,
    },
    services::{children::ChildService, metrics::MESSAGES_COUNTER, users::UserService},
};

pub const MAX_MESSAGE_CHARS: usize = 4000;

pub struct ChatService;

impl ChatService {
    /// Returns the conversation between the caller and `participant_id`,
    /// creating it on first use.
    pub async fn open(
        pool: &PgPool,
        user: &AuthenticatedUser,
        participant_id: Uuid,
    ) -> ApiResult<Conversation> {
        let (parent_id, teacher_id) = match user.role {
            UserRole::Parent => {
                UserService::ensure_role(pool, participant_id, UserRole::Teacher).await?;
                (user.user_id, participant_id)
            }
            UserRole::Teacher => {
                UserService::ensure_role(pool, participant_id, UserRole::Parent).await?;
                (participant_id, user.user_id)
            }
            UserRole::Reception | UserRole::Admin => return Err(ApiError::Forbidden),
        };
        if !ChildService::teacher_teaches_parent(pool, teacher_id, parent_id).await? {
            return Err(ApiError::Forbidden);
        }

        // The no-op update makes RETURNING yield the existing row on conflict.
        let conv = sqlx::query_as::<_, Conversation>(
            "INSERT INTO chat_conversations (parent_id, teacher_id)
             VALUES ($1, $2)
             ON CONFLICT (parent_id, teacher_id) DO UPDATE SET parent_id = EXCLUDED.parent_id
             RETURNING *",
        )
        .bind(parent_id)
        .bind(teacher_id)
        .fetch_one(pool)
        .await?;
        Ok(conv)
    }

    pub async fn list(pool: &PgPool, user: &AuthenticatedUser) -> ApiResult<Vec<ConversationSummary>> {
        let flag = read_flag_column(user.role).ok_or(ApiError::Forbidden)?;
        let rows = sqlx::query_as::<_, ConversationSummary>(&format!(
            "SELECT c.id, c.parent_id, c.teacher_id,
                    o.first_name || ' ' || o.last_name AS other_name,
                    lm.content AS last_message,
                    lm.created_at AS last_at,
                    (SELECT COUNT(*) FROM chat_messages m
                      WHERE m.conversation_id = c.id AND m.sender_id <> $1 AND NOT m.{flag}) AS unread_count
             FROM chat_conversations c
             JOIN users o ON o.id = CASE WHEN c.parent_id = $1 THEN c.teacher_id ELSE c.parent_id END
             LEFT JOIN LATERAL (
                 SELECT content, created_at FROM chat_messages
                 WHERE conversation_id = c.id
                 ORDER BY created_at DESC
                 LIMIT 1
             ) lm ON TRUE
             WHERE c.parent_id = $1 OR c.teacher_id = $1
             ORDER BY lm.created_at DESC NULLS LAST, c.created_at DESC"
        ))
        .bind(user.user_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Loads a conversation, hiding it from anyone who is not a participant.
    pub async fn get_for_participant(pool: &PgPool, user_id: Uuid, id: Uuid) -> ApiResult<Conversation> {
        let conv = sqlx::query_as::<_, Conversation>("SELECT * FROM chat_conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .filter(|c| c.has_participant(user_id))
            .ok_or(ApiError::NotFound("Conversation"))?;
        Ok(conv)
    }

    /// One page of messages, oldest first within the page. Page 1 is the most recent.
    pub async fn messages(
        pool: &PgPool,
        user: &AuthenticatedUser,
        conversation_id: Uuid,
        page: &PaginationQuery,
    ) -> ApiResult<Vec<ChatMessage>> {
        Self::get_for_participant(pool, user.user_id, conversation_id).await?;
        let mut messages = sqlx::query_as::<_, ChatMessage>(
            "SELECT * FROM chat_messages
             WHERE conversation_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(conversation_id)
        .bind(page.per_page())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;
        messages.reverse();
        Ok(messages)
    }

    pub async fn send(
        pool: &PgPool,
        redis: &mut MultiplexedConnection,
        sender: &AuthenticatedUser,
        conversation_id: Uuid,
        content: &str,
    ) -> ApiResult<ChatMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::bad_request("Message cannot be empty"));
        }
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ApiError::bad_request("Message is too long"));
        }
        let conv = Self::get_for_participant(pool, sender.user_id, conversation_id).await?;

        let message = sqlx::query_as::<_, ChatMessage>(
            "INSERT INTO chat_messages
               (conversation_id, sender_id, sender_role, content, read_by_parent, read_by_teacher)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(conv.id)
        .bind(sender.user_id)
        .bind(sender.role)
        .bind(content)
        .bind(sender.role == UserRole::Parent)
        .bind(sender.role == UserRole::Teacher)
        .fetch_one(pool)
        .await?;

        MESSAGES_COUNTER.with_label_values(&[sender.role.as_str()]).inc();
        publish(redis, &[conv.parent_id, conv.teacher_id], &message).await;
        Ok(message)
    }

    /// Sets the caller's read flag on messages sent by the other participant.
    pub async fn mark_read(pool: &PgPool, user: &AuthenticatedUser, conversation_id: Uuid) -> ApiResult<u64> {
        let flag = read_flag_column(user.role).ok_or(ApiError::Forbidden)?;
        Self::get_for_participant(pool, user.user_id, conversation_id).await?;
        let res = sqlx::query(&format!(
            "UPDATE chat_messages SET {flag} = TRUE
             WHERE conversation_id = $1 AND sender_id <> $2 AND NOT {flag}"
        ))
        .bind(conversation_id)
        .bind(user.user_id)
        .execute(pool)
        .await?;
        Ok(res.rows_affected())
    }
}

/// Fan-out is best effort: the message is already stored.
async fn publish(redis: &mut MultiplexedConnection, recipients: &[Uuid], message: &ChatMessage) {
    let envelope = WsMessage {
        kind: "chat_message".to_string(),
        payload: serde_json::to_value(message).unwrap_or_default(),
    };
    let payload = match serde_json::to_string(&envelope) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("chat: failed to encode message {}: {e}", message.id);
            return;
        }
    };
    for user_id in recipients {
        if let Err(e) = redis.publish::<_, _, ()>(user_channel(*user_id), &payload).await {
            tracing::warn!("chat: publish to {user_id} failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use axum::http::StatusCode;

    async fn insert_message(pool: &PgPool, conv: &Conversation, sender: &AuthenticatedUser, content: &str) {
        sqlx::query(
            "INSERT INTO chat_messages (conversation_id, sender_id, sender_role, content)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(conv.id)
        .bind(sender.user_id)
        .bind(sender.role)
        .bind(content)
        .execute(pool)
        .await
        .unwrap();
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_open_is_idempotent_and_parent_teacher_only(pool: PgPool) {
        let parent = fixtures::user(&pool, UserRole::Parent).await;
        let teacher = fixtures::user(&pool, UserRole::Teacher).await;
        let stranger = fixtures::user(&pool, UserRole::Teacher).await;
        let admin = fixtures::user(&pool, UserRole::Admin).await;
        fixtures::child(&pool, parent.user_id, Some(teacher.user_id), None).await;

        let first = ChatService::open(&pool, &parent, teacher.user_id).await.unwrap();
        let again = ChatService::open(&pool, &teacher, parent.user_id).await.unwrap();
        assert_eq!(first.id, again.id);

        let err = ChatService::open(&pool, &stranger, parent.user_id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let err = ChatService::open(&pool, &admin, teacher.user_id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = ChatService::get_for_participant(&pool, stranger.user_id, first.id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_mark_read_sets_only_the_readers_flag(pool: PgPool) {
        let parent = fixtures::user(&pool, UserRole::Parent).await;
        let teacher = fixtures::user(&pool, UserRole::Teacher).await;
        fixtures::child(&pool, parent.user_id, Some(teacher.user_id), None).await;
        let conv = ChatService::open(&pool, &parent, teacher.user_id).await.unwrap();

        insert_message(&pool, &conv, &teacher, "Kofi ate well today").await;
        insert_message(&pool, &conv, &teacher, "Nap at 13:00").await;
        insert_message(&pool, &conv, &parent, "Thank you!").await;

        let summaries = ChatService::list(&pool, &parent).await.unwrap();
        assert_eq!(summaries[0].unread_count, 2);

        assert_eq!(ChatService::mark_read(&pool, &parent, conv.id).await.unwrap(), 2);
        assert_eq!(ChatService::mark_read(&pool, &parent, conv.id).await.unwrap(), 0);
        assert_eq!(ChatService::list(&pool, &parent).await.unwrap()[0].unread_count, 0);
        assert_eq!(ChatService::list(&pool, &teacher).await.unwrap()[0].unread_count, 1);
    }
}
