use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use uuid::Uuid;

use crate::{
    error::ApiResult,
    middleware::auth::{require_role, TEACHER},
    models::{auth::AuthenticatedUser, media::Media},
    routes::file_response,
    services::media::MediaService,
    AppState,
};

pub async fn upload_media(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Media>)> {
    require_role(&user, TEACHER)?;
    let media = MediaService::upload(
        &state.db,
        &user,
        &state.config.media_dir,
        &state.master_key,
        multipart,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(media)))
}

pub async fn serve_media_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let (media, bytes) = MediaService::download(
        &state.db,
        &user,
        id,
        &state.config.media_dir,
        &state.master_key,
    )
    .await?;
    Ok(file_response(&media.content_type, &media.original_filename, bytes))
}

pub async fn delete_media(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    MediaService::delete(&state.db, &user, id, &state.config.media_dir).await?;
    Ok(StatusCode::NO_CONTENT)
}
