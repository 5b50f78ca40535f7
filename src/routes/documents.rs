use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use uuid::Uuid;

use crate::{
    error::ApiResult,
    middleware::auth::{require_role, RECEPTION_DESK},
    models::{
        auth::AuthenticatedUser,
        document::{Document, DocumentQuery, DocumentWithOwner, RejectDocumentRequest, ReviewDecision},
    },
    routes::file_response,
    services::documents::DocumentService,
    AppState,
};

// ── Owner side ───────────────────────────────────────────────────────────────

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Document>)> {
    let doc = DocumentService::upload(
        &state.db,
        &user,
        &state.config.media_dir,
        &state.master_key,
        multipart,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

pub async fn list_my_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<Document>>> {
    Ok(Json(DocumentService::list_own(&state.db, user.user_id).await?))
}

pub async fn download_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let (doc, bytes) = DocumentService::download(
        &state.db,
        &user,
        id,
        &state.config.media_dir,
        &state.master_key,
    )
    .await?;
    Ok(file_response(&doc.content_type, &doc.original_filename, bytes))
}

pub async fn delete_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    DocumentService::delete_own(&state.db, user.user_id, id, &state.config.media_dir).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Review queue (reception and admin) ───────────────────────────────────────

pub async fn list_review_queue(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<DocumentQuery>,
) -> ApiResult<Json<Vec<DocumentWithOwner>>> {
    require_role(&user, RECEPTION_DESK)?;
    Ok(Json(DocumentService::list_for_review(&state.db, &user, &query).await?))
}

pub async fn approve_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Document>> {
    require_role(&user, RECEPTION_DESK)?;
    let doc = DocumentService::review(&state.db, &user, id, ReviewDecision::Approve).await?;
    Ok(Json(doc))
}

pub async fn reject_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectDocumentRequest>,
) -> ApiResult<Json<Document>> {
    require_role(&user, RECEPTION_DESK)?;
    let decision = ReviewDecision::Reject { reason: body.reason };
    let doc = DocumentService::review(&state.db, &user, id, decision).await?;
    Ok(Json(doc))
}
