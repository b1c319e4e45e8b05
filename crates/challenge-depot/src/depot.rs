//! The challenge depot: durable issuance and one-shot validation.
//!
//! ```text
//! issue()     → 24 random bytes → base64 → put(ns, token, token) → commit → token
//! validate(c) → begin → take(ns, c) → commit → matched?
//! ```
//!
//! The depot keeps no token state of its own. Whether two validations of the
//! same token can both succeed is decided entirely by the backend's `take`,
//! which checks and removes the key in one step.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use depot_common::DepotError;
use depot_common::constants::{CHALLENGE_BYTES, DEFAULT_NAMESPACE};
use tracing::{debug, info, warn};

use crate::entropy::{EntropySource, OsEntropy};
use crate::store::{KvTransaction, StoreError, TransactionalKeyValueStore};

/// The two operations exposed to the enrollment protocol handler
pub trait ChallengeAuthority: Send + Sync {
    /// Generate and durably record a new challenge
    fn issue_challenge(&self) -> Result<String, DepotError>;

    /// Atomically check a presented challenge and consume it on match
    ///
    /// An `Err` must be treated exactly like `Ok(false)` when deciding
    /// whether to grant enrollment.
    fn check_and_consume(&self, candidate: &str) -> Result<bool, DepotError>;

    /// Confirm the namespace is reachable, without mutating anything
    fn probe(&self) -> Result<(), DepotError>;
}

/// Single-use challenge store over a transactional key-value backend
pub struct ChallengeDepot<S, E = OsEntropy> {
    store: Arc<S>,
    namespace: String,
    entropy: E,
}

impl<S: TransactionalKeyValueStore> ChallengeDepot<S, OsEntropy> {
    /// Bind a depot to the default challenge namespace, creating it if absent
    pub fn initialize(store: Arc<S>) -> Result<Self, DepotError> {
        Self::with_namespace(store, DEFAULT_NAMESPACE, OsEntropy)
    }
}

impl<S, E> ChallengeDepot<S, E>
where
    S: TransactionalKeyValueStore,
    E: EntropySource,
{
    /// Bind a depot to `namespace`, creating it if absent
    ///
    /// Re-initializing over an existing namespace leaves its tokens alone.
    pub fn with_namespace(
        store: Arc<S>,
        namespace: impl Into<String>,
        entropy: E,
    ) -> Result<Self, DepotError> {
        let namespace = namespace.into();

        let mut txn = store.begin().map_err(init_err)?;
        let created = txn.create_namespace(&namespace).map_err(init_err)?;
        txn.commit().map_err(init_err)?;

        info!(namespace = %namespace, created, "Challenge depot ready");

        Ok(Self {
            store,
            namespace,
            entropy,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Issue a new challenge
    ///
    /// The token is returned only once its write transaction has committed.
    pub fn issue(&self) -> Result<String, DepotError> {
        let mut key = [0u8; CHALLENGE_BYTES];
        self.entropy
            .fill(&mut key)
            .map_err(DepotError::EntropySource)?;

        let challenge = STANDARD.encode(key);

        let mut txn = self.store.begin().map_err(persist_err)?;
        txn.put(&self.namespace, challenge.as_bytes(), challenge.as_bytes())
            .map_err(persist_err)?;
        txn.commit().map_err(persist_err)?;

        debug!(namespace = %self.namespace, "Challenge issued");
        Ok(challenge)
    }

    /// Validate a presented challenge, consuming it on match
    ///
    /// Returns `Ok(false)` for anything that is not a live challenge,
    /// including one a concurrent validation consumed first.
    pub fn validate(&self, candidate: &str) -> Result<bool, DepotError> {
        let mut txn = self.store.begin().map_err(validate_err)?;
        let present = txn
            .take(&self.namespace, candidate.as_bytes())
            .map_err(validate_err)?
            .is_some();
        txn.commit().map_err(validate_err)?;

        if present {
            info!(namespace = %self.namespace, "Challenge consumed");
        } else {
            debug!(namespace = %self.namespace, "Challenge not found");
        }
        Ok(present)
    }

    /// Check the namespace is still there
    pub fn probe(&self) -> Result<(), DepotError> {
        let mut txn = self.store.begin().map_err(validate_err)?;
        let exists = txn.namespace_exists(&self.namespace);
        if let Err(e) = txn.rollback() {
            warn!(error = %e, "Probe rollback failed");
        }
        if exists.map_err(validate_err)? {
            Ok(())
        } else {
            Err(validate_err(StoreError::NamespaceMissing(self.namespace.clone())))
        }
    }
}

impl<S, E> ChallengeAuthority for ChallengeDepot<S, E>
where
    S: TransactionalKeyValueStore,
    E: EntropySource,
{
    fn issue_challenge(&self) -> Result<String, DepotError> {
        self.issue()
    }

    fn check_and_consume(&self, candidate: &str) -> Result<bool, DepotError> {
        self.validate(candidate)
    }

    fn probe(&self) -> Result<(), DepotError> {
        ChallengeDepot::probe(self)
    }
}

fn init_err(e: StoreError) -> DepotError {
    DepotError::StorageInit(Box::new(e))
}

fn persist_err(e: StoreError) -> DepotError {
    DepotError::StoragePersist(Box::new(e))
}

fn validate_err(e: StoreError) -> DepotError {
    match e {
        StoreError::NamespaceMissing(_) => DepotError::NamespaceMissing(Box::new(e)),
        other => DepotError::StorageTransaction(Box::new(other)),
    }
}
