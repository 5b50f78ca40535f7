use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    error::ApiResult,
    middleware::rate_limit::{check_rate_limit, login_key},
    models::{
        auth::AuthenticatedUser,
        user::{
            ChangePasswordRequest, LoginRequest, LoginResponse, RefreshTokenRequest,
            RegisterRequest, UserProfile,
        },
    },
    services::auth::AuthService,
    AppState,
};

/// Login attempts allowed per email within the window.
const LOGIN_MAX_ATTEMPTS: u64 = 5;
const LOGIN_WINDOW_SECS: u64 = 15 * 60;

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let mut redis = state.redis.clone();
    check_rate_limit(&mut redis, &login_key(&body.email), LOGIN_MAX_ATTEMPTS, LOGIN_WINDOW_SECS).await?;

    let res = AuthService::login(&state.db, &state.config, &body.email, &body.password).await?;
    Ok(Json(res))
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let user = AuthService::register(&state.db, &body).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let res = AuthService::refresh(&state.db, &state.config, &body.refresh_token).await?;
    Ok(Json(res))
}

pub async fn logout(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> ApiResult<Json<Value>> {
    AuthService::logout(&state.db, &state.config, &body.refresh_token).await?;
    Ok(Json(json!({ "message": "Logged out" })))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<UserProfile>> {
    let me = AuthService::me(&state.db, user.user_id).await?;
    Ok(Json(me.into()))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> ApiResult<Json<Value>> {
    AuthService::change_password(&state.db, user.user_id, &body.current_password, &body.new_password)
        .await?;
    Ok(Json(json!({ "message": "Password changed, please sign in again" })))
}
