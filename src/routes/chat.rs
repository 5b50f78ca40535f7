use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::ApiResult,
    models::{
        auth::AuthenticatedUser,
        chat::{ChatMessage, Conversation, ConversationSummary, OpenConversationRequest, SendChatMessageRequest},
        PaginationQuery,
    },
    services::chat::ChatService,
    AppState,
};

pub async fn list_conversations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    Ok(Json(ChatService::list(&state.db, &user).await?))
}

pub async fn open_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<OpenConversationRequest>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(ChatService::open(&state.db, &user, body.participant_id).await?))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(ChatService::get_for_participant(&state.db, user.user_id, id).await?))
}

pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(page): Query<PaginationQuery>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    Ok(Json(ChatService::messages(&state.db, &user, id, &page).await?))
}

pub async fn send_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<SendChatMessageRequest>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let mut redis = state.redis.clone();
    let message = ChatService::send(&state.db, &mut redis, &user, id, &body.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let updated = ChatService::mark_read(&state.db, &user, id).await?;
    Ok(Json(json!({ "marked_read": updated })))
}
