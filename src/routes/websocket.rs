use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::{
    error::{ApiError, ApiResult},
    middleware::auth::decode_access_token,
    models::{auth::AuthenticatedUser, chat::user_channel},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    pub token: String,
}

/// GET /ws?token=<access token>. Browsers cannot set headers on the upgrade
/// request, so the token travels in the query string.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
) -> ApiResult<Response> {
    let user = decode_access_token(&params.token, &state.config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;

    Ok(ws.on_upgrade(move |socket| async move {
        info!(user = %user.user_id, "websocket connected");
        handle_socket(socket, state, user).await;
    }))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: AuthenticatedUser) {
    let (mut sender, mut receiver) = socket.split();

    let mut pubsub = match state.redis_client.get_async_pubsub().await {
        Ok(c) => c,
        Err(e) => {
            error!("redis pubsub error: {e}");
            return;
        }
    };
    let channel = user_channel(user.user_id);
    if let Err(e) = pubsub.subscribe(&channel).await {
        error!("redis subscribe to {channel} failed: {e}");
        return;
    }

    // Redis → socket. Payloads are already WsMessage envelopes.
    let mut redis_task = tokio::spawn(async move {
        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!("dropping undecodable chat payload: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // Clients only listen; drain until they close.
    let mut client_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut redis_task) => client_task.abort(),
        _ = (&mut client_task) => redis_task.abort(),
    }

    info!(user = %user.user_id, "websocket disconnected");
}
