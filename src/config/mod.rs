use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    /// `None` when `USE_OBJECT_STORAGE` is off; photos are then stored inline.
    pub storage: Option<StorageConfig>,
    pub photo_key_prefix: String,
    pub local_store_dir: PathBuf,
    pub admin_code: Option<String>,
    pub sticker_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub s3_endpoint: String,
    pub s3_public_endpoint: Option<String>,
    pub s3_region: String,
    pub s3_bucket: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let use_object_storage: bool = env_or_parse("USE_OBJECT_STORAGE", "false")?;
        let storage = if use_object_storage {
            Some(StorageConfig {
                s3_endpoint: env_or_err("S3_ENDPOINT")?,
                s3_public_endpoint: std::env::var("S3_PUBLIC_ENDPOINT").ok(),
                s3_region: env_or("S3_REGION", "us-east-1"),
                s3_bucket: env_or_err("S3_BUCKET")?,
            })
        } else {
            None
        };

        Ok(Self {
            database_url: env_or_err("DATABASE_URL")?,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "5")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            storage,
            photo_key_prefix: env_or("PHOTO_KEY_PREFIX", "posts"),
            local_store_dir: PathBuf::from(env_or("LOCAL_STORE_DIR", ".mural")),
            admin_code: std::env::var("ADMIN_CODE").ok().filter(|code| !code.is_empty()),
            sticker_dir: PathBuf::from(env_or("STICKER_DIR", "assets/stickers")),
        })
    }

    pub fn use_object_storage(&self) -> bool {
        self.storage.is_some()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}
