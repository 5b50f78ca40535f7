use crate::error::ApiError;

/// Checks a key-scoped attempt counter stored in Redis.
///
/// `SET key 0 EX window NX` then INCR in one pipeline: the counter always
/// carries a TTL, and later attempts do not extend the window. Exceeding
/// `max_attempts` is a 429. A Redis outage does not block logins.
pub async fn check_rate_limit(
    redis: &mut redis::aio::MultiplexedConnection,
    key: &str,
    max_attempts: u64,
    window_secs: u64,
) -> Result<(), ApiError> {
    let result: redis::RedisResult<(u64,)> = redis::pipe()
        .atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("EX")
        .arg(window_secs)
        .arg("NX")
        .ignore()
        .cmd("INCR")
        .arg(key)
        .query_async(redis)
        .await;

    match result {
        Ok((count,)) => exceeds(count, max_attempts),
        Err(e) => {
            tracing::warn!("rate limit counter unavailable for {key}: {e}");
            Ok(())
        }
    }
}

fn exceeds(count: u64, max_attempts: u64) -> Result<(), ApiError> {
    if count > max_attempts {
        return Err(ApiError::TooManyRequests);
    }
    Ok(())
}

pub fn login_key(email: &str) -> String {
    format!("rate:login:{}", email.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_boundary() {
        assert!(exceeds(5, 5).is_ok());
        assert!(matches!(exceeds(6, 5), Err(ApiError::TooManyRequests)));
    }

    #[test]
    fn test_login_key_is_case_insensitive() {
        assert_eq!(login_key(" Parent@Mail.com"), login_key("parent@mail.com"));
    }

    // Needs a Redis server, run with: REDIS_URL=redis://127.0.0.1 cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_counter_always_expires() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let client = redis::Client::open(url).unwrap();
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let key = format!("rate:test:{}", uuid::Uuid::new_v4());

        for _ in 0..3 {
            check_rate_limit(&mut conn, &key, 2, 60).await.ok();
        }
        let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut conn).await.unwrap();
        assert!(ttl > 0 && ttl <= 60);
        assert!(matches!(
            check_rate_limit(&mut conn, &key, 2, 60).await,
            Err(ApiError::TooManyRequests)
        ));
    }
}
