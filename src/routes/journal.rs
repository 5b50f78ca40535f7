//! Teacher-recorded daily log: activities and meals.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::ApiResult,
    middleware::auth::{require_role, TEACHER},
    models::{
        activity::{Activity, CreateActivityRequest},
        auth::AuthenticatedUser,
        meal::{CreateMealRequest, Meal},
    },
    services::{activities::ActivityService, meals::MealService},
    AppState,
};

pub async fn create_activity(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateActivityRequest>,
) -> ApiResult<(StatusCode, Json<Activity>)> {
    require_role(&user, TEACHER)?;
    let activity = ActivityService::create(&state.db, &user, &body).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

pub async fn delete_activity(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_role(&user, TEACHER)?;
    ActivityService::delete(&state.db, user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_meal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateMealRequest>,
) -> ApiResult<(StatusCode, Json<Meal>)> {
    require_role(&user, TEACHER)?;
    let meal = MealService::create(&state.db, &user, &body).await?;
    Ok((StatusCode::CREATED, Json(meal)))
}

pub async fn delete_meal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_role(&user, TEACHER)?;
    MealService::delete(&state.db, user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
