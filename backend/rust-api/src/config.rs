use serde::Deserialize;
use std::env;

use crate::models::AttemptBackend;

pub const DEFAULT_LOCAL_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// Where locally scoped attempt snapshots are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalStoreKind {
    File,
    Redis,
    Memory,
}

impl std::str::FromStr for LocalStoreKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "file" => Ok(LocalStoreKind::File),
            "redis" => Ok(LocalStoreKind::Redis),
            "memory" => Ok(LocalStoreKind::Memory),
            _ => Err(format!("Invalid local store: {}", value)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: Option<String>,
    pub mongo_database: String,
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    pub processing_api_url: String,
    pub attempt_backend: AttemptBackend,
    pub local_store: LocalStoreKind,
    pub local_store_dir: String,
    pub local_store_quota_bytes: u64,
    pub bind_addr: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        // Root .env first (two levels up), then the local one.
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/{env}.toml, overridden by APP__SECTION__KEY variables.
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let lookup = |key: &str, var: &str| -> Option<String> {
            settings
                .get_string(key)
                .ok()
                .or_else(|| env::var(var).ok())
                .filter(|value| !value.trim().is_empty())
        };

        let jwt_secret = match lookup("auth.jwt_secret", "JWT_SECRET") {
            Some(secret) => secret,
            None if app_env == "prod" => {
                anyhow::bail!("JWT_SECRET must be set in production")
            }
            None => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            }
        };

        let attempt_backend = match lookup("attempts.backend", "ATTEMPT_BACKEND") {
            Some(value) => value.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            None => AttemptBackend::Remote,
        };

        let local_store = match lookup("attempts.local_store", "LOCAL_STORE") {
            Some(value) => value.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            None => LocalStoreKind::File,
        };

        let local_store_quota_bytes = match lookup("attempts.local_quota_bytes", "LOCAL_STORE_QUOTA_BYTES") {
            Some(value) => value
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid local store quota {:?}: {}", value, e))?,
            None => DEFAULT_LOCAL_QUOTA_BYTES,
        };

        Ok(Config {
            mongo_uri: lookup("database.mongo_uri", "MONGO_URI"),
            mongo_database: lookup("database.mongo_database", "MONGO_DATABASE")
                .unwrap_or_else(|| "sabuho".to_string()),
            redis_uri: lookup("redis.uri", "REDIS_URI"),
            jwt_secret,
            processing_api_url: lookup("processing.url", "PROCESSING_API_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            attempt_backend,
            local_store,
            local_store_dir: lookup("attempts.local_dir", "LOCAL_STORE_DIR")
                .unwrap_or_else(|| ".sabuho".to_string()),
            local_store_quota_bytes,
            bind_addr: lookup("server.bind", "BIND_ADDR")
                .unwrap_or_else(|| "0.0.0.0:8081".to_string()),
        })
    }

    /// Settings for running without external services.
    pub fn for_tests() -> Self {
        Config {
            mongo_uri: None,
            mongo_database: "sabuho_test".to_string(),
            redis_uri: None,
            jwt_secret: "test-secret".to_string(),
            processing_api_url: "http://127.0.0.1:9".to_string(),
            attempt_backend: AttemptBackend::Remote,
            local_store: LocalStoreKind::Memory,
            local_store_dir: ".sabuho-test".to_string(),
            local_store_quota_bytes: DEFAULT_LOCAL_QUOTA_BYTES,
            bind_addr: "127.0.0.1:0".to_string(),
        }
    }
}
