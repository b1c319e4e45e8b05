//! Wire types shared between depotd and its clients.

use serde::{Deserialize, Serialize};

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded SQLite database file
    #[default]
    Sqlite,
    /// Redis server (must run with AOF persistence)
    Redis,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Redis => "redis",
        }
    }
}

/// Response to a successful issuance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueResponse {
    /// The freshly issued challenge, to be delivered out-of-band
    pub challenge: String,
}

/// A challenge presented for one-shot validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub challenge: String,
}

/// Validation result
///
/// `matched` is false both for unknown challenges and for validation
/// failures; the distinction lives in the operator logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub matched: bool,
}

/// Error body returned to requesters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
