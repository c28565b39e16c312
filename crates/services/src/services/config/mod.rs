use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

const CONFIG_VERSION: &str = "v1";

fn default_config_version() -> String {
    CONFIG_VERSION.to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Clone, Debug, Serialize, Deserialize, TS, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_secs() -> u64 {
    60
}

fn default_max_delay_secs() -> u64 {
    3600
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_batch_size() -> u32 {
    25
}

/// Outgoing webhook delivery settings
#[derive(Clone, Debug, Serialize, Deserialize, TS, PartialEq)]
pub struct WebhookConfig {
    /// Attempts before a delivery is marked failed (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt (default: 60)
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    /// Upper bound on the retry delay (default: 3600)
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// HTTP timeout per attempt (default: 10)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How often the worker looks for due deliveries (default: 5)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Deliveries claimed per poll (default: 25)
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            timeout_secs: default_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

#[derive(Clone, Debug, Serialize, Deserialize, TS, PartialEq)]
pub struct WikiConfig {
    /// Revisions kept per page by the periodic cleanup. `None` disables it.
    #[serde(default)]
    pub revision_retention: Option<u32>,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            revision_retention: None,
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_per_page() -> u32 {
    15
}

fn default_max_per_page() -> u32 {
    100
}

/// Configuration for list endpoint pagination
#[derive(Clone, Debug, Serialize, Deserialize, TS, PartialEq)]
pub struct PaginationConfig {
    /// Page size when the request does not ask for one (default: 15)
    #[serde(default = "default_per_page")]
    pub default_per_page: u32,
    /// Largest page size a request may ask for (default: 100)
    #[serde(default = "default_max_per_page")]
    pub max_per_page: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, TS, PartialEq)]
pub struct Config {
    #[serde(default = "default_config_version")]
    pub config_version: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub wiki: WikiConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            server: ServerConfig::default(),
            webhooks: WebhookConfig::default(),
            wiki: WikiConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }
}

impl From<String> for Config {
    fn from(raw_config: String) -> Self {
        match serde_json::from_str::<Config>(&raw_config) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Config file could not be parsed, using defaults: {}", e);
                Config::default()
            }
        }
    }
}

impl Config {
    /// Apply `HOST`, `PORT` / `BACKEND_PORT` from the environment.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HOST")
            && !host.trim().is_empty()
        {
            self.server.host = host;
        }
        let port = std::env::var("BACKEND_PORT")
            .or_else(|_| std::env::var("PORT"))
            .ok()
            .and_then(|s| s.trim().parse::<u16>().ok());
        if let Some(port) = port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.webhooks.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "webhooks.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.webhooks.base_delay_secs > self.webhooks.max_delay_secs {
            return Err(ConfigError::ValidationError(
                "webhooks.base_delay_secs must not exceed webhooks.max_delay_secs".to_string(),
            ));
        }
        if self.wiki.revision_retention == Some(0) {
            return Err(ConfigError::ValidationError(
                "wiki.revision_retention must be at least 1".to_string(),
            ));
        }
        if self.pagination.default_per_page == 0
            || self.pagination.default_per_page > self.pagination.max_per_page
        {
            return Err(ConfigError::ValidationError(
                "pagination.default_per_page must be between 1 and pagination.max_per_page"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Will always return config, falling back to defaults for a missing or broken file
pub async fn load_config_from_file(config_path: &Path) -> Config {
    match tokio::fs::read_to_string(config_path).await {
        Ok(raw_config) => Config::from(raw_config),
        Err(_) => {
            tracing::info!("No config file found at {}, using defaults", config_path.display());
            Config::default()
        }
    }
}

/// Saves the config to the given path
pub async fn save_config_to_file(config: &Config, config_path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = config_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let raw_config = serde_json::to_string_pretty(config)?;
    tokio::fs::write(config_path, raw_config).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.config_version, "v1");
        assert_eq!(config.webhooks.max_attempts, 5);
        assert_eq!(config.webhooks.base_delay_secs, 60);
        assert_eq!(config.webhooks.max_delay_secs, 3600);
        assert_eq!(config.pagination.default_per_page, 15);
        assert_eq!(config.pagination.max_per_page, 100);
        assert_eq!(config.wiki.revision_retention, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = Config::from(
            r#"{"webhooks": {"max_attempts": 3}, "wiki": {"revision_retention": 20}}"#.to_string(),
        );
        assert_eq!(config.webhooks.max_attempts, 3);
        assert_eq!(config.webhooks.timeout_secs, 10);
        assert_eq!(config.wiki.revision_retention, Some(20));
        assert_eq!(config.wiki.cleanup_interval_secs, 3600);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_invalid_json_falls_back_to_defaults() {
        let config = Config::from("{not json".to_string());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_rejects_zero_retention() {
        let mut config = Config::default();
        config.wiki.revision_retention = Some(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.server.port = 9999;

        save_config_to_file(&config, &path).await.unwrap();
        let loaded = load_config_from_file(&path).await;
        assert_eq!(loaded.server.port, 9999);
    }
}
