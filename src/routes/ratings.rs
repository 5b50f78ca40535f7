use axum::{extract::State, Json};
use serde::Serialize;

use crate::{
    error::ApiResult,
    middleware::auth::{require_role, ADMIN, PARENT, TEACHER},
    models::{
        auth::AuthenticatedUser,
        rating::{RateTeacherRequest, RatingWithParent, TeacherRating, TeacherRatingSummary},
    },
    services::ratings::RatingService,
    AppState,
};

#[derive(Serialize)]
pub struct MyRatings {
    pub summary: Option<TeacherRatingSummary>,
    pub ratings: Vec<RatingWithParent>,
}

pub async fn rate_teacher(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<RateTeacherRequest>,
) -> ApiResult<Json<TeacherRating>> {
    require_role(&user, PARENT)?;
    Ok(Json(RatingService::rate(&state.db, user.user_id, &body).await?))
}

pub async fn parent_list_ratings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<TeacherRating>>> {
    require_role(&user, PARENT)?;
    Ok(Json(RatingService::list_by_parent(&state.db, user.user_id).await?))
}

pub async fn teacher_my_ratings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<MyRatings>> {
    require_role(&user, TEACHER)?;
    let (summary, ratings) = tokio::try_join!(
        RatingService::summaries(&state.db, Some(user.user_id)),
        RatingService::list_for_teacher(&state.db, user.user_id),
    )?;
    Ok(Json(MyRatings {
        summary: summary.into_iter().next(),
        ratings,
    }))
}

pub async fn admin_rating_summaries(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<TeacherRatingSummary>>> {
    require_role(&user, ADMIN)?;
    Ok(Json(RatingService::summaries(&state.db, None).await?))
}
