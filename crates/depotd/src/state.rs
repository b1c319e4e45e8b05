//! Application state and shared resources.

use anyhow::{Context, Result};
use std::sync::Arc;

use challenge_depot::{ChallengeAuthority, ChallengeDepot, OsEntropy, RedisStore, SqliteStore};
use depot_common::BackendKind;

use crate::config::AppConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// The challenge depot, behind whichever backend was configured
    pub authority: Arc<dyn ChallengeAuthority>,
}

impl AppState {
    /// Open the configured backend and initialize the depot on it
    pub fn new(config: AppConfig) -> Result<Self> {
        let authority: Arc<dyn ChallengeAuthority> = match config.backend {
            BackendKind::Sqlite => {
                let store = SqliteStore::open(&config.database_path, config.busy_timeout())
                    .with_context(|| format!("Failed to open database {}", config.database_path))?;
                Arc::new(
                    ChallengeDepot::with_namespace(Arc::new(store), &config.namespace, OsEntropy)
                        .context("Failed to initialize challenge depot")?,
                )
            }
            BackendKind::Redis => {
                let store = RedisStore::open(&config.redis_url).context("Failed to connect to Redis")?;
                Arc::new(
                    ChallengeDepot::with_namespace(Arc::new(store), &config.namespace, OsEntropy)
                        .context("Failed to initialize challenge depot")?,
                )
            }
        };

        Ok(Self::with_authority(config, authority))
    }

    /// Wrap an already-initialized authority
    pub fn with_authority(config: AppConfig, authority: Arc<dyn ChallengeAuthority>) -> Self {
        Self { config, authority }
    }
}
