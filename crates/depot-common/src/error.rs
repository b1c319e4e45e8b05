//! Error taxonomy for the challenge depot.
//!
//! Every variant belongs to exactly one depot operation, so a caller (or an
//! operator reading logs) can tell issuance failures from validation failures
//! without inspecting the underlying cause.

use std::fmt;

use thiserror::Error;

/// Boxed source error carried by every [`DepotError`] variant
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The depot operation an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Initialize,
    Issue,
    Validate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Issue => "issue",
            Self::Validate => "validate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the challenge depot
#[derive(Debug, Error)]
pub enum DepotError {
    /// The challenge namespace could not be created
    #[error("initialize: storage init error")]
    StorageInit(#[source] BoxError),

    /// The OS random source could not supply bytes
    #[error("issue: entropy source error")]
    EntropySource(#[source] BoxError),

    /// A freshly generated challenge could not be persisted
    #[error("issue: storage persist error")]
    StoragePersist(#[source] BoxError),

    /// The challenge namespace is gone
    #[error("validate: namespace missing")]
    NamespaceMissing(#[source] BoxError),

    /// The validation transaction could not begin or commit
    #[error("validate: storage transaction error")]
    StorageTransaction(#[source] BoxError),
}

impl DepotError {
    /// Returns the operation that produced this error
    pub fn operation(&self) -> Operation {
        match self {
            Self::StorageInit(_) => Operation::Initialize,
            Self::EntropySource(_) | Self::StoragePersist(_) => Operation::Issue,
            Self::NamespaceMissing(_) | Self::StorageTransaction(_) => Operation::Validate,
        }
    }

    /// Returns true if the process should not keep serving after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StorageInit(_) | Self::EntropySource(_))
    }

    /// Returns the HTTP status code for this error
    ///
    /// Validation failures map to 403, the same status a requester sees for a
    /// wrong challenge.
    pub fn status_code(&self) -> u16 {
        match self.operation() {
            Operation::Initialize | Operation::Issue => 503,
            Operation::Validate => 403,
        }
    }
}
