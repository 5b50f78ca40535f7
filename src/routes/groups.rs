use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::ApiResult,
    middleware::auth::{require_role, ADMIN, RECEPTION_DESK, TEACHER},
    models::{
        auth::AuthenticatedUser,
        group::{CreateGroupRequest, Group, GroupWithCount, SetChildrenRequest, UpdateGroupRequest},
    },
    services::groups::GroupService,
    AppState,
};

/// Reception needs the group list to place children; only admins edit groups.
pub async fn list_groups(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<GroupWithCount>>> {
    require_role(&user, RECEPTION_DESK)?;
    Ok(Json(GroupService::list(&state.db, None).await?))
}

pub async fn teacher_list_groups(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<GroupWithCount>>> {
    require_role(&user, TEACHER)?;
    Ok(Json(GroupService::list(&state.db, Some(user.user_id)).await?))
}

pub async fn create_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<Group>)> {
    require_role(&user, ADMIN)?;
    let group = GroupService::create(&state.db, &body).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn update_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateGroupRequest>,
) -> ApiResult<Json<Group>> {
    require_role(&user, ADMIN)?;
    Ok(Json(GroupService::update(&state.db, id, &body).await?))
}

pub async fn delete_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_role(&user, ADMIN)?;
    GroupService::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_group_children(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<SetChildrenRequest>,
) -> ApiResult<Json<Value>> {
    require_role(&user, ADMIN)?;
    let attached = GroupService::set_children(&state.db, id, &body.child_ids).await?;
    Ok(Json(json!({ "group_id": id, "children": attached })))
}
