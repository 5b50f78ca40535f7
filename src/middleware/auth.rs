use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::error::ApiError;
use crate::models::auth::{AuthenticatedUser, Claims};
use crate::models::user::UserRole;

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header format".into()))?;

        let secret = parts
            .extensions
            .get::<JwtSecret>()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("JWT secret not configured")))?;

        decode_access_token(token, &secret.0)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))
    }
}

/// Extension type to carry the JWT secret through request extensions.
#[derive(Clone)]
pub struct JwtSecret(pub String);

pub fn decode_access_token(token: &str, secret: &str) -> Result<AuthenticatedUser, anyhow::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let data = decode::<Claims>(token, &key, &validation)?;
    let claims = data.claims;

    Ok(AuthenticatedUser {
        user_id: claims.sub.parse()?,
        role: claims.role,
    })
}

/// Route guard: the caller's role must be one of `allowed`.
pub fn require_role(user: &AuthenticatedUser, allowed: &[UserRole]) -> Result<(), ApiError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        tracing::debug!(user = %user.user_id, role = %user.role, "role guard rejected request");
        Err(ApiError::Forbidden)
    }
}

pub const ADMIN: &[UserRole] = &[UserRole::Admin];
pub const RECEPTION_DESK: &[UserRole] = &[UserRole::Reception, UserRole::Admin];
pub const TEACHER: &[UserRole] = &[UserRole::Teacher];
pub const PARENT: &[UserRole] = &[UserRole::Parent];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::AuthService;
    use axum::{body::Body, http::Request, http::StatusCode, routing::get, Extension, Router};
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "test-secret";

    fn admin_only_router() -> Router {
        Router::new()
            .route(
                "/admin/ping",
                get(|user: AuthenticatedUser| async move {
                    require_role(&user, ADMIN).map(|_| "pong")
                }),
            )
            .layer(Extension(JwtSecret(SECRET.to_string())))
    }

    fn bearer(role: UserRole) -> String {
        let token = AuthService::issue_access_token(Uuid::new_v4(), role, SECRET, 900).unwrap();
        format!("Bearer {token}")
    }

    #[test]
    fn test_token_round_trip() {
        let id = Uuid::new_v4();
        let token = AuthService::issue_access_token(id, UserRole::Reception, SECRET, 900).unwrap();
        let user = decode_access_token(&token, SECRET).unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.role, UserRole::Reception);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token =
            AuthService::issue_access_token(Uuid::new_v4(), UserRole::Admin, SECRET, 900).unwrap();
        assert!(decode_access_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            role: UserRole::Parent,
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(decode_access_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_require_role() {
        let teacher = AuthenticatedUser { user_id: Uuid::new_v4(), role: UserRole::Teacher };
        assert!(require_role(&teacher, TEACHER).is_ok());
        assert!(matches!(require_role(&teacher, ADMIN), Err(ApiError::Forbidden)));
        assert!(require_role(&teacher, RECEPTION_DESK).is_err());

        let reception = AuthenticatedUser { user_id: Uuid::new_v4(), role: UserRole::Reception };
        assert!(require_role(&reception, RECEPTION_DESK).is_ok());
        assert!(require_role(&reception, PARENT).is_err());
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let res = admin_only_router()
            .oneshot(Request::get("/admin/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_header_is_unauthorized() {
        let res = admin_only_router()
            .oneshot(
                Request::get("/admin/ping")
                    .header("Authorization", "Token abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_role_is_forbidden() {
        let res = admin_only_router()
            .oneshot(
                Request::get("/admin/ping")
                    .header("Authorization", bearer(UserRole::Parent))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_passes_guard() {
        let res = admin_only_router()
            .oneshot(
                Request::get("/admin/ping")
                    .header("Authorization", bearer(UserRole::Admin))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
