use crate::domain::sync::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    /// Per-request timeout in seconds.
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub sync_interval: u64,
    pub max_retry: u32,
    pub backoff_base: u64,
    pub backoff_max: u64,
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/relief.db?mode=rwc".to_string(),
                max_connections: 5,
                connection_timeout: 30,
            },
            remote: RemoteConfig {
                base_url: "http://localhost:8080/api".to_string(),
                api_token: None,
                request_timeout: 30,
            },
            sync: SyncConfig::default(),
            storage: StorageConfig {
                data_dir: "./data".to_string(),
            },
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval: 300, // 5 minutes
            max_retry: 5,
            backoff_base: 30,
            backoff_max: 900, // 15 minutes
            concurrency: 4,
        }
    }
}

impl SyncConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retry,
            Duration::from_secs(self.backoff_base),
            Duration::from_secs(self.backoff_max),
        )
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval)
    }
}

impl DatabaseConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl StorageConfig {
    pub fn image_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("images")
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("RELIEF_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Some(value) = env_parsed::<u32>("RELIEF_DB_MAX_CONNECTIONS") {
            cfg.database.max_connections = value;
        }

        if let Ok(v) = std::env::var("RELIEF_API_BASE_URL") {
            if !v.trim().is_empty() {
                cfg.remote.base_url = v.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(v) = std::env::var("RELIEF_API_TOKEN") {
            let token = v.trim().to_string();
            cfg.remote.api_token = if token.is_empty() { None } else { Some(token) };
        }
        if let Some(value) = env_parsed::<u64>("RELIEF_REQUEST_TIMEOUT_SECS") {
            cfg.remote.request_timeout = value.max(1);
        }

        if let Ok(v) = std::env::var("RELIEF_AUTO_SYNC") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Some(value) = env_parsed::<u64>("RELIEF_SYNC_INTERVAL_SECS") {
            cfg.sync.sync_interval = value.max(1);
        }
        if let Some(value) = env_parsed::<u32>("RELIEF_SYNC_MAX_RETRIES") {
            cfg.sync.max_retry = value;
        }
        if let Some(value) = env_parsed::<u64>("RELIEF_SYNC_BACKOFF_BASE_SECS") {
            cfg.sync.backoff_base = value;
        }
        if let Some(value) = env_parsed::<u64>("RELIEF_SYNC_BACKOFF_MAX_SECS") {
            cfg.sync.backoff_max = value;
        }
        if let Some(value) = env_parsed::<usize>("RELIEF_SYNC_CONCURRENCY") {
            cfg.sync.concurrency = value;
        }

        if let Ok(v) = std::env::var("RELIEF_DATA_DIR") {
            if !v.trim().is_empty() {
                cfg.storage.data_dir = v.trim().to_string();
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.remote.base_url.trim().is_empty() {
            return Err("Remote base_url must not be empty".to_string());
        }
        if self.remote.request_timeout == 0 {
            return Err("Remote request_timeout must be greater than 0".to_string());
        }
        if self.sync.max_retry == 0 {
            return Err("Sync max_retry must be greater than 0".to_string());
        }
        if self.sync.concurrency == 0 {
            return Err("Sync concurrency must be greater than 0".to_string());
        }
        if self.sync.auto_sync && self.sync.sync_interval == 0 {
            return Err("Sync sync_interval must be greater than 0".to_string());
        }
        if self.sync.backoff_max < self.sync.backoff_base {
            return Err("Sync backoff_max must not be lower than backoff_base".to_string());
        }
        Ok(())
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}
