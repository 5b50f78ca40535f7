use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    middleware::{
        auth::{require_role, ADMIN, PARENT, RECEPTION_DESK},
        super_admin::SuperAdminAuth,
    },
    models::{
        auth::AuthenticatedUser,
        user::{
            CreateUserRequest, CreatedUserResponse, ReceptionSummary, UpdateUserRequest, User,
            UserProfile, UserQuery, UserRole,
        },
    },
    services::{storage, users::UserService},
    AppState,
};

/// Roles the reception desk onboards.
const ONBOARDED_ROLES: &[UserRole] = &[UserRole::Parent, UserRole::Teacher];

fn profiles(users: Vec<User>) -> Vec<UserProfile> {
    users.into_iter().map(UserProfile::from).collect()
}

// ── Admin ────────────────────────────────────────────────────────────────────

pub async fn admin_list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<UserProfile>>> {
    require_role(&user, ADMIN)?;
    let users = UserService::search(&state.db, &query, &UserRole::ALL).await?;
    Ok(Json(profiles(users)))
}

pub async fn admin_get_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserProfile>> {
    require_role(&user, ADMIN)?;
    Ok(Json(UserService::get(&state.db, id).await?.into()))
}

pub async fn admin_create_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<CreatedUserResponse>)> {
    require_role(&user, ADMIN)?;
    let created = UserService::create(&state.db, &body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn admin_update_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserProfile>> {
    require_role(&user, ADMIN)?;
    if id == user.user_id && (body.role.is_some() || body.is_active == Some(false)) {
        return Err(ApiError::bad_request("You cannot change your own role or deactivate yourself"));
    }
    Ok(Json(UserService::update(&state.db, id, &body).await?.into()))
}

pub async fn admin_delete_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_role(&user, ADMIN)?;
    if id == user.user_id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }
    let files = UserService::delete(&state.db, id).await?;
    for path in &files {
        storage::remove(&state.config.media_dir, path).await;
    }
    tracing::info!(user = %id, by = %user.user_id, files = files.len(), "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn admin_list_receptions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<ReceptionSummary>>> {
    require_role(&user, ADMIN)?;
    Ok(Json(UserService::list_receptions(&state.db).await?))
}

pub async fn admin_activate_reception(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserProfile>> {
    require_role(&user, ADMIN)?;
    let updated = UserService::set_active(&state.db, id, UserRole::Reception, true).await?;
    Ok(Json(updated.into()))
}

pub async fn admin_deactivate_reception(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserProfile>> {
    require_role(&user, ADMIN)?;
    let updated = UserService::set_active(&state.db, id, UserRole::Reception, false).await?;
    Ok(Json(updated.into()))
}

// ── Reception onboarding ─────────────────────────────────────────────────────

pub async fn reception_list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<UserProfile>>> {
    require_role(&user, RECEPTION_DESK)?;
    let users = UserService::search(&state.db, &query, ONBOARDED_ROLES).await?;
    Ok(Json(profiles(users)))
}

/// Reception creates parent and teacher accounts only. A temporary password
/// is generated unless one is supplied, and returned once.
pub async fn reception_create_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<CreatedUserResponse>)> {
    require_role(&user, RECEPTION_DESK)?;
    if !body.role.is_onboarded_by_reception() {
        return Err(ApiError::Forbidden);
    }
    let body = CreateUserRequest { password: None, ..body };
    let created = UserService::create(&state.db, &body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn reception_verify_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserProfile>> {
    require_role(&user, RECEPTION_DESK)?;
    Ok(Json(UserService::verify(&state.db, id).await?.into()))
}

// ── Parent ───────────────────────────────────────────────────────────────────

/// Teachers the parent may rate or message.
pub async fn parent_list_teachers(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<UserProfile>>> {
    require_role(&user, PARENT)?;
    let teachers = UserService::teachers_for_parent(&state.db, user.user_id).await?;
    Ok(Json(profiles(teachers)))
}

// ── Super-admin ──────────────────────────────────────────────────────────────

pub async fn super_admin_list_admins(
    State(state): State<AppState>,
    _auth: SuperAdminAuth,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<UserProfile>>> {
    let users = UserService::search(&state.db, &query, ADMIN).await?;
    Ok(Json(profiles(users)))
}

pub async fn super_admin_create_admin(
    State(state): State<AppState>,
    _auth: SuperAdminAuth,
    Json(body): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<CreatedUserResponse>)> {
    let body = CreateUserRequest { role: UserRole::Admin, ..body };
    let created = UserService::create(&state.db, &body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn super_admin_deactivate_admin(
    State(state): State<AppState>,
    _auth: SuperAdminAuth,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    UserService::set_active(&state.db, id, UserRole::Admin, false).await?;
    Ok(Json(json!({ "id": id, "is_active": false })))
}
