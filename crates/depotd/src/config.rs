//! Configuration management for depotd.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use depot_common::BackendKind;
use depot_common::constants::{
    DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_DATABASE_PATH, DEFAULT_LISTEN_ADDR, DEFAULT_NAMESPACE,
    DEFAULT_REDIS_URL, DEFAULT_REQUEST_TIMEOUT_SECS,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Storage backend holding the challenges
    #[serde(default)]
    pub backend: BackendKind,

    /// SQLite database file (sqlite backend)
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Redis connection URL (redis backend)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Namespace the challenges live in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Per-request deadline in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long a SQLite writer waits for the lock, in milliseconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_database_path() -> String { DEFAULT_DATABASE_PATH.to_string() }
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_namespace() -> String { DEFAULT_NAMESPACE.to_string() }
fn default_request_timeout() -> u64 { DEFAULT_REQUEST_TIMEOUT_SECS }
fn default_busy_timeout() -> u64 { DEFAULT_BUSY_TIMEOUT_MS }

/// Values given on the command line, applied over file and environment
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub listen: Option<String>,
    pub backend: Option<BackendKind>,
    pub database_path: Option<String>,
    pub redis_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from file and `DEPOT_*` environment, with CLI overrides
    pub fn load(config_path: &str, overrides: &Overrides) -> Result<Self> {
        let mut builder = config::Config::builder();
        if Path::new(config_path).exists() {
            builder = builder.add_source(config::File::with_name(config_path));
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
        }

        let mut config: Self = builder
            .add_source(config::Environment::with_prefix("DEPOT"))
            .build()
            .context("Failed to load config")?
            .try_deserialize()
            .context("Failed to parse config")?;

        // Apply CLI overrides
        if let Some(ref listen) = overrides.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(backend) = overrides.backend {
            config.backend = backend;
        }
        if let Some(ref path) = overrides.database_path {
            config.database_path = path.clone();
        }
        if let Some(ref redis_url) = overrides.redis_url {
            config.redis_url = redis_url.clone();
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            backend: BackendKind::default(),
            database_path: default_database_path(),
            redis_url: default_redis_url(),
            namespace: default_namespace(),
            request_timeout_secs: default_request_timeout(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load("/nonexistent/depotd.toml", &Overrides::default()).unwrap();
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.request_timeout(), Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
    }

    #[test]
    fn test_file_then_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depotd.toml");
        std::fs::write(
            &path,
            "backend = \"redis\"\nnamespace = \"alt_challenges\"\nlisten_addr = \"0.0.0.0:9000\"\n",
        )
        .unwrap();

        let overrides = Overrides {
            listen: Some("127.0.0.1:9999".to_string()),
            ..Default::default()
        };
        let config = AppConfig::load(path.to_str().unwrap(), &overrides).unwrap();

        assert_eq!(config.backend, BackendKind::Redis);
        assert_eq!(config.namespace, "alt_challenges");
        assert_eq!(config.listen_addr, "127.0.0.1:9999");
        assert_eq!(config.database_path, DEFAULT_DATABASE_PATH);
    }
}
