//! Process configuration, resolved once at startup and passed explicitly.

use std::env;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CIPHER: &str = "cipher-algo=aes256";
const DEFAULT_S3_REGION: &str = "us-east-1";
const DEFAULT_DISPATCH_CRON: &str = "0 * * * * *";
const DEFAULT_DISPATCH_BATCH_SIZE: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("either S3_BUCKET or LOCAL_STORAGE_PATH must be set")]
    NoObjectStore,
}

/// Where media blobs live
#[derive(Debug, Clone)]
pub enum ObjectStoreConfig {
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
    },
    Local(PathBuf),
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub port: u16,
    pub jwt_secret: Vec<u8>,
    pub jwt_cron_secret: Vec<u8>,
    pub credentials_key: String,
    pub credentials_cipher: String,
    pub object_store: ObjectStoreConfig,
    pub twitter_api_key: String,
    pub twitter_api_secret: String,
    pub dispatch_cron: String,
    pub dispatch_batch_size: usize,
    /// Mark session cookies `Secure` (ENV=prod)
    pub secure_cookies: bool,
    pub cookie_same_site: &'static str,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let object_store = match (env::var("LOCAL_STORAGE_PATH").ok(), env::var("S3_BUCKET").ok()) {
            (Some(path), _) => ObjectStoreConfig::Local(PathBuf::from(path)),
            (None, Some(bucket)) => ObjectStoreConfig::S3 {
                bucket,
                region: env::var("S3_REGION").unwrap_or_else(|_| DEFAULT_S3_REGION.to_string()),
                endpoint: env::var("S3_ENDPOINT").ok(),
            },
            (None, None) => return Err(ConfigError::NoObjectStore),
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            max_connections: positive("DATABASE_MAX_CONNECTIONS").unwrap_or(DEFAULT_MAX_CONNECTIONS),
            port: positive("PORT").unwrap_or(DEFAULT_PORT),
            jwt_secret: required("JWT_SECRET")?.into_bytes(),
            jwt_cron_secret: required("JWT_CRON_SECRET")?.into_bytes(),
            credentials_key: required("CREDENTIALS_KEY")?,
            credentials_cipher: env::var("CREDENTIALS_CIPHER")
                .unwrap_or_else(|_| DEFAULT_CIPHER.to_string()),
            object_store,
            twitter_api_key: required("TWITTER_API_KEY")?,
            twitter_api_secret: required("TWITTER_API_SECRET")?,
            dispatch_cron: env::var("DISPATCH_CRON")
                .unwrap_or_else(|_| DEFAULT_DISPATCH_CRON.to_string()),
            dispatch_batch_size: positive("DISPATCH_BATCH_SIZE")
                .unwrap_or(DEFAULT_DISPATCH_BATCH_SIZE),
            secure_cookies: env::var("ENV").as_deref() == Ok("prod"),
            cookie_same_site: same_site(env::var("COOKIE_SAMESITE").ok().as_deref()),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn same_site(value: Option<&str>) -> &'static str {
    match value.map(str::to_lowercase).as_deref() {
        Some("none") => "None",
        Some("strict") => "Strict",
        _ => "Lax",
    }
}

fn positive<T>(name: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|v| *v > T::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_site_defaults_to_lax() {
        assert_eq!(same_site(None), "Lax");
        assert_eq!(same_site(Some("NONE")), "None");
        assert_eq!(same_site(Some("strict")), "Strict");
        assert_eq!(same_site(Some("sideways")), "Lax");
    }
}
