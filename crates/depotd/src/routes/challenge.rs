//! Challenge issuance and validation endpoints.
//!
//! Depot calls run a blocking storage transaction, so they go through
//! `spawn_blocking`. A request that times out still lets its transaction
//! finish (or roll back) on the blocking pool.

use axum::{Json, extract::State, http::StatusCode};

use depot_common::{ErrorResponse, IssueResponse, VerifyRequest, VerifyResponse};
use crate::state::AppState;

const UNAVAILABLE: &str = "enrollment temporarily unavailable";

/// Issue a new challenge
pub async fn issue_challenge(
    State(state): State<AppState>,
) -> Result<Json<IssueResponse>, (StatusCode, Json<ErrorResponse>)> {
    let authority = state.authority.clone();

    match tokio::task::spawn_blocking(move || authority.issue_challenge()).await {
        Ok(Ok(challenge)) => {
            tracing::debug!("Issued challenge");
            Ok(Json(IssueResponse { challenge }))
        }
        Ok(Err(e)) => {
            tracing::error!(
                error = ?e,
                operation = %e.operation(),
                fatal = e.is_fatal(),
                "Challenge issuance failed"
            );
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
            Err(unavailable(status))
        }
        Err(e) => {
            tracing::error!(error = %e, "Issuance task failed");
            Err(unavailable(StatusCode::SERVICE_UNAVAILABLE))
        }
    }
}

/// Validate and consume a presented challenge
///
/// Storage failures answer `matched: false`, same as an unknown challenge.
pub async fn verify_challenge(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> Json<VerifyResponse> {
    let authority = state.authority.clone();
    let candidate = payload.challenge;

    let matched = match tokio::task::spawn_blocking(move || authority.check_and_consume(&candidate))
        .await
    {
        Ok(Ok(matched)) => matched,
        Ok(Err(e)) => {
            tracing::warn!(
                error = ?e,
                operation = %e.operation(),
                "Challenge validation failed, rejecting"
            );
            false
        }
        Err(e) => {
            tracing::warn!(error = %e, "Validation task failed, rejecting");
            false
        }
    };

    tracing::debug!(matched, "Verified challenge");
    Json(VerifyResponse { matched })
}

fn unavailable(status: StatusCode) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: UNAVAILABLE.to_string(),
        }),
    )
}
