use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{error::ApiError, AppState};

/// Extractor that validates the `X-Super-Admin-Key` header against `config.super_admin_key`.
/// Every request is refused while no key is configured.
pub struct SuperAdminAuth;

impl FromRequestParts<AppState> for SuperAdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get("X-Super-Admin-Key")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing X-Super-Admin-Key header".into()))?;

        check_key(key, state.config.super_admin_key.as_deref())?;
        Ok(SuperAdminAuth)
    }
}

fn check_key(given: &str, configured: Option<&str>) -> Result<(), ApiError> {
    let expected = configured
        .ok_or_else(|| ApiError::Unauthorized("Super-admin access is not configured".into()))?;
    if !keys_match(given, expected) {
        return Err(ApiError::Unauthorized("Invalid super-admin key".into()));
    }
    Ok(())
}

/// Length-independent comparison so the key is not leaked through timing.
fn keys_match(given: &str, expected: &str) -> bool {
    use sha2::{Digest, Sha256};
    let a = Sha256::digest(given.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_match() {
        assert!(keys_match("s3cret", "s3cret"));
        assert!(!keys_match("s3cret", "s3cret "));
        assert!(!keys_match("", "s3cret"));
    }

    #[test]
    fn test_unconfigured_key_refuses_everything() {
        assert!(matches!(check_key("", None), Err(ApiError::Unauthorized(_))));
        assert!(matches!(
            check_key("change_this_super_admin_key", None),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(check_key("s3cret", Some("s3cret")).is_ok());
        assert!(check_key("guess", Some("s3cret")).is_err());
    }
}
