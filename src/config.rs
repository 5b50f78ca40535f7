use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_expiry_seconds: u64,
    pub jwt_refresh_expiry_days: u64,
    pub media_dir: String,
    /// 64 hex characters (32 bytes) used to derive per-owner file keys.
    pub encryption_master_key: String,
    pub host: String,
    pub port: u16,
    /// Unset disables the super-admin portal.
    pub super_admin_key: Option<String>,
    pub app_base_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            database_url: required("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_refresh_secret: required("JWT_REFRESH_SECRET")?,
            jwt_expiry_seconds: env::var("JWT_EXPIRY_SECONDS")
                .unwrap_or_else(|_| "900".into())
                .parse()?,
            jwt_refresh_expiry_days: env::var("JWT_REFRESH_EXPIRY_DAYS")
                .unwrap_or_else(|_| "30".into())
                .parse()?,
            media_dir: env::var("MEDIA_DIR").unwrap_or_else(|_| "/data/uploads".into()),
            encryption_master_key: required("ENCRYPTION_MASTER_KEY")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            super_admin_key: optional_secret("SUPER_ADMIN_KEY"),
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost".into()),
        };
        config.master_key_bytes()?;
        Ok(config)
    }

    /// Decoded encryption master key.
    pub fn master_key_bytes(&self) -> anyhow::Result<[u8; 32]> {
        parse_master_key(&self.encryption_master_key)
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

/// A blank value counts as unset.
fn optional_secret(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn parse_master_key(hex_key: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex::decode(hex_key.trim())
        .map_err(|_| anyhow::anyhow!("ENCRYPTION_MASTER_KEY must be hex encoded"))?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("ENCRYPTION_MASTER_KEY must decode to exactly 32 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_master_key() {
        let key = parse_master_key(&"ab".repeat(32)).unwrap();
        assert_eq!(key, [0xab; 32]);
    }

    #[test]
    fn test_parse_master_key_rejects_bad_input() {
        assert!(parse_master_key("not-hex").is_err());
        assert!(parse_master_key(&"00".repeat(16)).is_err());
    }
}
