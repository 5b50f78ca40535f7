use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::ApiResult,
    middleware::auth::{require_role, PARENT, RECEPTION_DESK, TEACHER},
    models::{
        activity::Activity,
        auth::AuthenticatedUser,
        child::{Child, ChildQuery, CreateChildRequest, UpdateChildRequest, UpdateEmergencyContactRequest},
        meal::Meal,
        media::Media,
        DateRangeQuery,
    },
    services::{
        activities::ActivityService, children::ChildService, meals::MealService, media::MediaService,
        storage,
    },
    AppState,
};

// ── Front office (reception and admin) ───────────────────────────────────────

pub async fn list_children(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ChildQuery>,
) -> ApiResult<Json<Vec<Child>>> {
    require_role(&user, RECEPTION_DESK)?;
    Ok(Json(ChildService::list(&state.db, &query).await?))
}

pub async fn get_child(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Child>> {
    require_role(&user, RECEPTION_DESK)?;
    Ok(Json(ChildService::get(&state.db, id).await?))
}

pub async fn create_child(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateChildRequest>,
) -> ApiResult<(StatusCode, Json<Child>)> {
    require_role(&user, RECEPTION_DESK)?;
    let child = ChildService::create(&state.db, &body).await?;
    tracing::info!(child = %child.id, by = %user.user_id, "child created");
    Ok((StatusCode::CREATED, Json(child)))
}

pub async fn update_child(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateChildRequest>,
) -> ApiResult<Json<Child>> {
    require_role(&user, RECEPTION_DESK)?;
    Ok(Json(ChildService::update(&state.db, id, &body).await?))
}

pub async fn delete_child(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_role(&user, RECEPTION_DESK)?;
    let media_paths = ChildService::delete(&state.db, id).await?;
    for path in &media_paths {
        storage::remove(&state.config.media_dir, path).await;
    }
    tracing::info!(child = %id, by = %user.user_id, files = media_paths.len(), "child deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ── Teacher and parent views ─────────────────────────────────────────────────

pub async fn teacher_list_children(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<Child>>> {
    require_role(&user, TEACHER)?;
    Ok(Json(ChildService::list_for_teacher(&state.db, user.user_id).await?))
}

pub async fn parent_list_children(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<Child>>> {
    require_role(&user, PARENT)?;
    Ok(Json(ChildService::list_for_parent(&state.db, user.user_id).await?))
}

pub async fn parent_update_emergency_contact(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateEmergencyContactRequest>,
) -> ApiResult<Json<Child>> {
    require_role(&user, PARENT)?;
    let child = ChildService::update_emergency_contact(&state.db, user.user_id, id, &body).await?;
    Ok(Json(child))
}

// ── Per-child records, for anyone allowed to view the child ──────────────────

pub async fn list_child_activities(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<Json<Vec<Activity>>> {
    ChildService::ensure_can_view(&state.db, &user, id).await?;
    Ok(Json(ActivityService::list_for_child(&state.db, id, &range).await?))
}

pub async fn list_child_meals(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<Json<Vec<Meal>>> {
    ChildService::ensure_can_view(&state.db, &user, id).await?;
    Ok(Json(MealService::list_for_child(&state.db, id, &range).await?))
}

pub async fn list_child_media(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<Json<Vec<Media>>> {
    ChildService::ensure_can_view(&state.db, &user, id).await?;
    Ok(Json(MediaService::list_for_child(&state.db, id, &range).await?))
}
