//! # depotd - Challenge Depot HTTP service
//!
//! Issues single-use SCEP challenge passwords and checks them exactly once.
//!
//! ## Architecture
//! ```text
//! SCEP server ──POST /challenge──▶ depotd ──▶ SQLite file | Redis (AOF)
//!             ──POST /verify─────▶
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod routes;
mod state;

use crate::config::{AppConfig, Overrides};
use crate::state::AppState;
use depot_common::BackendKind;

/// Challenge Depot - single-use SCEP challenge service
#[derive(Parser, Debug)]
#[command(name = "depotd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/depotd.toml")]
    config: String,

    /// Storage backend (overrides config)
    #[arg(long, value_parser = parse_backend, env = "DEPOT_BACKEND")]
    backend: Option<BackendKind>,

    /// SQLite database path (overrides config)
    #[arg(long, env = "DEPOT_DATABASE_PATH")]
    database_path: Option<String>,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            listen: self.listen.clone(),
            backend: self.backend,
            database_path: self.database_path.clone(),
            redis_url: self.redis_url.clone(),
        }
    }
}

fn parse_backend(value: &str) -> Result<BackendKind, String> {
    match value.to_ascii_lowercase().as_str() {
        "sqlite" => Ok(BackendKind::Sqlite),
        "redis" => Ok(BackendKind::Redis),
        other => Err(format!("unknown backend {other:?} (expected sqlite or redis)")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up a local .env before clap reads the environment
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting depotd v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load(&args.config, &args.overrides())?;
    info!(backend = config.backend.as_str(), namespace = %config.namespace, "Configuration loaded");

    // Opening storage blocks; a failure here is fatal
    let state = tokio::task::spawn_blocking({
        let config = config.clone();
        move || AppState::new(config)
    })
    .await
    .context("Depot initialization task failed")??;
    info!("Challenge depot initialized");

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("depotd listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("depotd shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend() {
        assert_eq!(parse_backend("SQLite"), Ok(BackendKind::Sqlite));
        assert_eq!(parse_backend("redis"), Ok(BackendKind::Redis));
        assert!(parse_backend("bolt").is_err());
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from(["depotd", "--backend", "redis", "--listen", "0.0.0.0:1"]);
        let overrides = args.overrides();
        assert_eq!(overrides.backend, Some(BackendKind::Redis));
        assert_eq!(overrides.listen.as_deref(), Some("0.0.0.0:1"));
    }
}
