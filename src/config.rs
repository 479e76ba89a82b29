use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf, str::FromStr};

use crate::auth::DEFAULT_TOKEN_TTL_HOURS;
use crate::images::DEFAULT_MAX_WIDTH;

pub const DEFAULT_BIND: &str = "0.0.0.0:4000";
pub const DEFAULT_IMAGES_DIR: &str = "images";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Runtime settings for the HTTP service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listen address, e.g. `0.0.0.0:4000`
    pub bind: String,
    /// HMAC secret for signing tokens
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    /// Directory where cover images are written and served from
    pub images_dir: PathBuf,
    /// Public origin used in image URLs. When unset the request's own
    /// scheme and host are used.
    pub public_base_url: Option<String>,
    pub max_upload_bytes: usize,
    pub image_max_width: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: env::var("GRIMOIRE_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_default(),
            token_ttl_hours: env_parse("GRIMOIRE_TOKEN_TTL_HOURS", DEFAULT_TOKEN_TTL_HOURS),
            images_dir: env::var("GRIMOIRE_IMAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_IMAGES_DIR)),
            public_base_url: env::var("GRIMOIRE_PUBLIC_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            max_upload_bytes: env_parse("GRIMOIRE_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            image_max_width: DEFAULT_MAX_WIDTH,
        }
    }
}

impl AppConfig {
    /// Settings for tests: fixed secret, no env lookups.
    pub fn for_tests(images_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind: "127.0.0.1:0".to_string(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            images_dir: images_dir.into(),
            public_base_url: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            image_max_width: DEFAULT_MAX_WIDTH,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.trim().is_empty() {
            bail!("JWT_SECRET must be set to a non-empty value");
        }
        if self.token_ttl_hours <= 0 {
            bail!("token lifetime must be positive (got {}h)", self.token_ttl_hours);
        }
        if let Some(url) = &self.public_base_url {
            url::Url::parse(url).map_err(|e| anyhow::anyhow!("invalid public url {:?}: {}", url, e))?;
        }
        Ok(())
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_secret() {
        let mut config = AppConfig::for_tests("images");
        assert!(config.validate().is_ok());

        config.jwt_secret = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_public_url() {
        let mut config = AppConfig::for_tests("images");
        config.public_base_url = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.public_base_url = Some("https://books.example.com".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_ttl() {
        let mut config = AppConfig::for_tests("images");
        config.token_ttl_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_is_not_serialized() {
        let value = serde_json::to_value(AppConfig::for_tests("images")).unwrap();
        assert!(value.get("jwt_secret").is_none());
        assert_eq!(value["token_ttl_hours"], 24);
    }
}
