pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Extension, Router,
};
use redis::Client as RedisClient;
use sqlx::PgPool;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use middleware::auth::JwtSecret;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub redis: redis::aio::MultiplexedConnection,
    pub redis_client: RedisClient,
    pub config: Arc<Config>,
    /// Decoded `ENCRYPTION_MASTER_KEY`.
    pub master_key: [u8; 32],
}

/// Largest accepted request body (media uploads).
const MAX_BODY_BYTES: usize = 110 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static("x-super-admin-key"),
        ]))
        .allow_origin(cors_origin(state.config.app_base_url.clone()));

    let jwt_secret = JwtSecret(state.config.jwt_secret.clone());

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Auth
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/refresh", post(routes::auth::refresh_token))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/change-password", post(routes::auth::change_password))
        // Admin portal
        .route("/admin/users", get(routes::users::admin_list_users).post(routes::users::admin_create_user))
        .route(
            "/admin/users/{id}",
            get(routes::users::admin_get_user)
                .put(routes::users::admin_update_user)
                .delete(routes::users::admin_delete_user),
        )
        .route("/admin/receptions", get(routes::users::admin_list_receptions))
        .route("/admin/receptions/{id}/activate", post(routes::users::admin_activate_reception))
        .route("/admin/receptions/{id}/deactivate", post(routes::users::admin_deactivate_reception))
        .route("/admin/groups", get(routes::groups::list_groups).post(routes::groups::create_group))
        .route(
            "/admin/groups/{id}",
            put(routes::groups::update_group).delete(routes::groups::delete_group),
        )
        .route("/admin/groups/{id}/children", put(routes::groups::set_group_children))
        .route("/admin/children", get(routes::children::list_children).post(routes::children::create_child))
        .route(
            "/admin/children/{id}",
            get(routes::children::get_child)
                .put(routes::children::update_child)
                .delete(routes::children::delete_child),
        )
        .route("/admin/documents", get(routes::documents::list_review_queue))
        .route("/admin/documents/{id}/approve", post(routes::documents::approve_document))
        .route("/admin/documents/{id}/reject", post(routes::documents::reject_document))
        .route("/admin/ratings", get(routes::ratings::admin_rating_summaries))
        .route("/admin/statistics", get(routes::statistics::admin_statistics))
        // Reception portal
        .route(
            "/reception/users",
            get(routes::users::reception_list_users).post(routes::users::reception_create_user),
        )
        .route("/reception/users/{id}/verify", post(routes::users::reception_verify_user))
        .route(
            "/reception/children",
            get(routes::children::list_children).post(routes::children::create_child),
        )
        .route(
            "/reception/children/{id}",
            get(routes::children::get_child)
                .put(routes::children::update_child)
                .delete(routes::children::delete_child),
        )
        .route("/reception/groups", get(routes::groups::list_groups))
        .route("/reception/documents", get(routes::documents::list_review_queue))
        .route("/reception/documents/{id}/approve", post(routes::documents::approve_document))
        .route("/reception/documents/{id}/reject", post(routes::documents::reject_document))
        // Teacher portal
        .route("/teacher/children", get(routes::children::teacher_list_children))
        .route("/teacher/groups", get(routes::groups::teacher_list_groups))
        .route("/teacher/activities", post(routes::journal::create_activity))
        .route("/teacher/activities/{id}", delete(routes::journal::delete_activity))
        .route("/teacher/meals", post(routes::journal::create_meal))
        .route("/teacher/meals/{id}", delete(routes::journal::delete_meal))
        .route("/teacher/media", post(routes::media::upload_media))
        .route("/teacher/ratings", get(routes::ratings::teacher_my_ratings))
        // Parent portal
        .route("/parent/children", get(routes::children::parent_list_children))
        .route(
            "/parent/children/{id}/emergency-contact",
            put(routes::children::parent_update_emergency_contact),
        )
        .route("/parent/teachers", get(routes::users::parent_list_teachers))
        .route(
            "/parent/ratings",
            get(routes::ratings::parent_list_ratings).post(routes::ratings::rate_teacher),
        )
        // Shared child records
        .route("/children/{id}/activities", get(routes::children::list_child_activities))
        .route("/children/{id}/meals", get(routes::children::list_child_meals))
        .route("/children/{id}/media", get(routes::children::list_child_media))
        .route("/media/{id}", delete(routes::media::delete_media))
        .route("/media/{id}/file", get(routes::media::serve_media_file))
        // Documents (any authenticated user)
        .route(
            "/documents",
            get(routes::documents::list_my_documents).post(routes::documents::upload_document),
        )
        .route("/documents/{id}", delete(routes::documents::delete_document))
        .route("/documents/{id}/file", get(routes::documents::download_document))
        // Chat
        .route(
            "/chat/conversations",
            get(routes::chat::list_conversations).post(routes::chat::open_conversation),
        )
        .route("/chat/conversations/{id}", get(routes::chat::get_conversation))
        .route(
            "/chat/conversations/{id}/messages",
            get(routes::chat::list_messages).post(routes::chat::send_message),
        )
        .route("/chat/conversations/{id}/read", post(routes::chat::mark_read))
        .route("/ws", get(routes::websocket::ws_handler))
        // Super-admin
        .route(
            "/super-admin/admins",
            get(routes::users::super_admin_list_admins).post(routes::users::super_admin_create_admin),
        )
        .route(
            "/super-admin/admins/{id}/deactivate",
            post(routes::users::super_admin_deactivate_admin),
        )
        .route("/super-admin/statistics", get(routes::statistics::super_admin_statistics))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(Extension(jwt_secret))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Allow the configured front-end origin, its subdomains, and localhost.
fn cors_origin(base_url: String) -> AllowOrigin {
    AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        origin
            .to_str()
            .map(|o| origin_allowed(o, &base_url))
            .unwrap_or(false)
    })
}

fn origin_allowed(origin: &str, base_url: &str) -> bool {
    if origin.starts_with("http://localhost") || origin.starts_with("http://127.0.0.1") {
        return true;
    }
    if origin == base_url {
        return true;
    }
    let Some((scheme, rest)) = base_url.split_once("://") else {
        return false;
    };
    let host = rest.split('/').next().unwrap_or(rest);
    let domain = host.split(':').next().unwrap_or(host);
    origin
        .strip_prefix(scheme)
        .and_then(|o| o.strip_prefix("://"))
        .is_some_and(|o| o.ends_with(&format!(".{domain}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_allowed() {
        let base = "https://school.example.org";
        assert!(origin_allowed("https://school.example.org", base));
        assert!(origin_allowed("https://admin.school.example.org", base));
        assert!(origin_allowed("http://localhost:5173", base));
        assert!(!origin_allowed("https://evil.org", base));
        assert!(!origin_allowed("https://school.example.org.evil.org", base));
        assert!(!origin_allowed("http://admin.school.example.org", base));
    }
}
