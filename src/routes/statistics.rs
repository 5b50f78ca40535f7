use axum::{extract::State, Json};

use crate::{
    error::ApiResult,
    middleware::{
        auth::{require_role, ADMIN},
        super_admin::SuperAdminAuth,
    },
    models::{auth::AuthenticatedUser, statistics::DashboardStatistics},
    services::statistics::StatisticsService,
    AppState,
};

pub async fn admin_statistics(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<DashboardStatistics>> {
    require_role(&user, ADMIN)?;
    Ok(Json(StatisticsService::dashboard(&state.db).await))
}

pub async fn super_admin_statistics(
    State(state): State<AppState>,
    _auth: SuperAdminAuth,
) -> Json<DashboardStatistics> {
    Json(StatisticsService::dashboard(&state.db).await)
}
