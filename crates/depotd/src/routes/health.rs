//! Liveness and readiness endpoints.
//!
//! `/health` never touches storage; `/ready` checks the challenge namespace.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::state::AppState;

/// Liveness report: the process is up and accepting connections
#[derive(Serialize)]
pub struct LivenessResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Report that depotd is serving, without touching storage
pub async fn health_check() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    backend: &'static str,
}

/// Readiness check (is the challenge namespace reachable?)
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, StatusCode> {
    let authority = state.authority.clone();
    let probe = tokio::task::spawn_blocking(move || authority.probe()).await;

    match probe {
        Ok(Ok(())) => Ok(Json(ReadyResponse {
            status: "ready",
            backend: state.config.backend.as_str(),
        })),
        Ok(Err(e)) => {
            tracing::warn!(error = ?e, "Readiness probe failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Readiness probe task failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
