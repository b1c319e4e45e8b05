//! HTTP route handlers for depotd.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod challenge;
mod health;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let timeout = state.config.request_timeout();

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))

        // Challenge endpoints
        .route("/challenge", post(challenge::issue_challenge))
        .route("/verify", post(challenge::verify_challenge))

        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())

        // Add shared state
        .with_state(state)
}
