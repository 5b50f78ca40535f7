use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    config::Config,
    db::USER_COLS,
    error::{ApiError, ApiResult},
    models::{
        auth::{Claims, RefreshClaims},
        user::{
            normalize_email, validate_password, LoginResponse, RefreshToken, RegisterRequest,
            User, UserRole,
        },
    },
    services::metrics::LOGINS_COUNTER,
};

/// bcrypt work factor for account passwords.
pub const PASSWORD_COST: u32 = 12;

pub struct AuthService;

impl AuthService {
    pub async fn login(
        pool: &PgPool,
        config: &Config,
        email: &str,
        password: &str,
    ) -> ApiResult<LoginResponse> {
        let email = normalize_email(email).map_err(|_| invalid_credentials())?;

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE email = $1"
        ))
        .bind(&email)
        .fetch_optional(pool)
        .await?;

        let Some(user) = user else {
            LOGINS_COUNTER.with_label_values(&["unknown_user"]).inc();
            return Err(invalid_credentials());
        };

        if !verify_password(password, &user.password_hash).await? {
            LOGINS_COUNTER.with_label_values(&["bad_password"]).inc();
            return Err(invalid_credentials());
        }
        if !user.is_active {
            LOGINS_COUNTER.with_label_values(&["inactive"]).inc();
            return Err(ApiError::Unauthorized("Account is inactive".into()));
        }

        LOGINS_COUNTER.with_label_values(&["success"]).inc();
        tracing::info!(user = %user.id, role = %user.role, "login");
        Self::issue_session(pool, config, user).await
    }

    /// Self-service sign-up. Only parents and teachers may register; the
    /// account stays unverified until reception checks it.
    pub async fn register(pool: &PgPool, req: &RegisterRequest) -> ApiResult<User> {
        if !req.role.is_onboarded_by_reception() {
            return Err(ApiError::bad_request("Only parent or teacher accounts can self-register"));
        }
        let email = normalize_email(&req.email).map_err(ApiError::bad_request)?;
        validate_password(&req.password).map_err(ApiError::bad_request)?;
        if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
            return Err(ApiError::bad_request("First and last name are required"));
        }

        let password_hash = hash_password(&req.password).await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, first_name, last_name, phone, role)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {USER_COLS}"
        ))
        .bind(&email)
        .bind(&password_hash)
        .bind(req.first_name.trim())
        .bind(req.last_name.trim())
        .bind(&req.phone)
        .bind(req.role)
        .fetch_one(pool)
        .await?;

        tracing::info!(user = %user.id, role = %user.role, "self-registration");
        Ok(user)
    }

    pub fn issue_access_token(
        user_id: Uuid,
        role: UserRole,
        secret: &str,
        ttl_seconds: u64,
    ) -> anyhow::Result<String> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: now,
            exp: now + ttl_seconds as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;
        Ok(token)
    }

    fn generate_refresh_token(
        user_id: &Uuid,
        secret: &str,
        ttl_days: u64,
    ) -> anyhow::Result<(String, Uuid)> {
        let now = Utc::now().timestamp() as usize;
        let jti = Uuid::new_v4();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: jti.to_string(),
            iat: now,
            exp: now + (ttl_days * 86400) as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;
        Ok((token, jti))
    }

    fn decode_refresh_token(token: &str, secret: &str) -> anyhow::Result<RefreshClaims> {
        let key = DecodingKey::from_secret(secret.as_bytes());
        let data = decode::<RefreshClaims>(token, &key, &Validation::new(Algorithm::HS256))?;
        Ok(data.claims)
    }

    /// Issue an access/refresh pair and persist the refresh token hash.
    async fn issue_session(pool: &PgPool, config: &Config, user: User) -> ApiResult<LoginResponse> {
        let access_token = Self::issue_access_token(
            user.id,
            user.role,
            &config.jwt_secret,
            config.jwt_expiry_seconds,
        )?;
        let (refresh_token, refresh_id) = Self::generate_refresh_token(
            &user.id,
            &config.jwt_refresh_secret,
            config.jwt_refresh_expiry_days,
        )?;

        let expires_at = Utc::now() + chrono::Duration::days(config.jwt_refresh_expiry_days as i64);
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(refresh_id)
        .bind(user.id)
        .bind(token_digest(&refresh_token))
        .bind(expires_at)
        .execute(pool)
        .await?;

        Ok(LoginResponse {
            access_token,
            refresh_token,
            user: user.into(),
        })
    }

    /// Rotate refresh token: revoke old, issue new pair.
    pub async fn refresh(
        pool: &PgPool,
        config: &Config,
        refresh_token: &str,
    ) -> ApiResult<LoginResponse> {
        let rc = Self::decode_refresh_token(refresh_token, &config.jwt_refresh_secret)
            .map_err(|_| ApiError::Unauthorized("Invalid refresh token".into()))?;
        let jti: Uuid = rc.jti.parse().map_err(anyhow::Error::from)?;
        let user_id: Uuid = rc.sub.parse().map_err(anyhow::Error::from)?;

        let stored: RefreshToken = sqlx::query_as(
            "SELECT id, user_id, token_hash, expires_at, revoked, created_at
             FROM refresh_tokens WHERE id = $1 AND revoked = FALSE",
        )
        .bind(jti)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Refresh token not found or revoked".into()))?;

        if stored.expires_at < Utc::now() {
            return Err(ApiError::Unauthorized("Refresh token expired".into()));
        }
        if stored.user_id != user_id || stored.token_hash != token_digest(refresh_token) {
            return Err(ApiError::Unauthorized("Refresh token invalid".into()));
        }

        // Conditional revoke: two concurrent refreshes of the same token cannot both win.
        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1 AND revoked = FALSE",
        )
        .bind(jti)
        .execute(pool)
        .await?;
        if revoked.rows_affected() == 0 {
            return Err(ApiError::Unauthorized("Refresh token already used".into()));
        }

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE id = $1 AND is_active = TRUE"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account is inactive".into()))?;

        Self::issue_session(pool, config, user).await
    }

    /// Revoke a refresh token (logout). Unknown or malformed tokens are ignored.
    pub async fn logout(pool: &PgPool, config: &Config, refresh_token: &str) -> ApiResult<()> {
        if let Ok(rc) = Self::decode_refresh_token(refresh_token, &config.jwt_refresh_secret) {
            if let Ok(jti) = rc.jti.parse::<Uuid>() {
                sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
                    .bind(jti)
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn me(pool: &PgPool, user_id: Uuid) -> ApiResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or(ApiError::NotFound("User"))
    }

    pub async fn change_password(
        pool: &PgPool,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> ApiResult<()> {
        validate_password(new_password).map_err(ApiError::bad_request)?;
        let user = Self::me(pool, user_id).await?;
        if !verify_password(current_password, &user.password_hash).await? {
            return Err(ApiError::bad_request("Current password is incorrect"));
        }

        let password_hash = hash_password(new_password).await?;
        sqlx::query(
            "UPDATE users SET password_hash = $1, force_password_change = FALSE, updated_at = NOW()
             WHERE id = $2",
        )
        .bind(&password_hash)
        .bind(user_id)
        .execute(pool)
        .await?;

        Self::revoke_all_sessions(pool, user_id).await
    }

    pub async fn revoke_all_sessions(pool: &PgPool, user_id: Uuid) -> ApiResult<()> {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND revoked = FALSE")
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid credentials".into())
}

/// bcrypt off the async executor.
pub async fn hash_password(password: &str) -> ApiResult<String> {
    let password = password.to_string();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, PASSWORD_COST))
        .await
        .map_err(anyhow::Error::from)?
        .map_err(anyhow::Error::from)?;
    Ok(hash)
}

/// A malformed stored hash counts as a mismatch.
pub async fn verify_password(password: &str, password_hash: &str) -> ApiResult<bool> {
    let password = password.to_string();
    let password_hash = password_hash.to_string();
    let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &password_hash).unwrap_or(false))
        .await
        .map_err(anyhow::Error::from)?;
    Ok(valid)
}

/// Refresh tokens are long JWTs, beyond bcrypt's 72-byte input limit, so they
/// are stored as a SHA-256 digest.
fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Random alphanumeric password handed out when staff create an account.
pub fn generate_temp_password() -> String {
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_token_round_trip() {
        let user_id = Uuid::new_v4();
        let (token, jti) = AuthService::generate_refresh_token(&user_id, "refresh", 30).unwrap();
        let claims = AuthService::decode_refresh_token(&token, "refresh").unwrap();
        assert_eq!(claims.jti, jti.to_string());
        assert_eq!(claims.sub, user_id.to_string());
        assert!(AuthService::decode_refresh_token(&token, "access").is_err());
    }

    #[test]
    fn test_token_digest_is_stable_and_distinct() {
        assert_eq!(token_digest("abc"), token_digest("abc"));
        assert_ne!(token_digest("abc"), token_digest("abd"));
        assert_eq!(token_digest("abc").len(), 64);
    }

    #[test]
    fn test_temp_password_shape() {
        let pw = generate_temp_password();
        assert_eq!(pw.len(), 12);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(validate_password(&pw).is_ok());
    }

    #[tokio::test]
    async fn test_verify_password_off_executor() {
        let hash = bcrypt::hash("correct horse", 4).unwrap();
        assert!(verify_password("correct horse", &hash).await.unwrap());
        assert!(!verify_password("wrong horse", &hash).await.unwrap());
        assert!(!verify_password("correct horse", "not-a-bcrypt-hash").await.unwrap());
    }
}
