//! Transactional key-value storage capability.
//!
//! The depot only ever talks to storage through these two traits. A backend
//! provides namespaces (isolated key spaces) and transactions with
//! begin/commit/rollback semantics; dropping a transaction that was never
//! committed must roll it back.
//!
//! Backends:
//! - [`SqliteStore`]: embedded file database, serialized writers
//! - [`RedisStore`]: Redis server, queued `MULTI`/`EXEC` writes and a
//!   server-side script for [`KvTransaction::take`]

mod redis;
mod sqlite;

pub use self::redis::{RedisStore, RedisTxn};
pub use self::sqlite::{SqliteStore, SqliteTxn};

use thiserror::Error;

/// Storage-level failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// The namespace has not been created
    #[error("namespace {0:?} not found")]
    NamespaceMissing(String),

    /// Watched keys changed between read and commit
    #[error("transaction conflict: watched keys changed before commit")]
    Conflict,

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("redis: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// One open transaction against a [`TransactionalKeyValueStore`]
pub trait KvTransaction {
    /// Create the namespace if absent. Returns true if it was created.
    fn create_namespace(&mut self, namespace: &str) -> Result<bool, StoreError>;

    fn namespace_exists(&mut self, namespace: &str) -> Result<bool, StoreError>;

    /// Fails with [`StoreError::NamespaceMissing`] if the namespace is absent.
    fn get(&mut self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&mut self, namespace: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn delete(&mut self, namespace: &str, key: &[u8]) -> Result<(), StoreError>;

    /// Remove `key` and return the value it held, as one indivisible step
    ///
    /// Of any number of concurrent `take`s on the same key, exactly one sees
    /// `Some`. A backend that cannot hold the key across the transaction may
    /// apply the removal immediately, in which case rollback does not restore it.
    fn take(&mut self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn commit(self) -> Result<(), StoreError>;

    fn rollback(self) -> Result<(), StoreError>;
}

/// A durable store that hands out transactions
///
/// Implementations are shared across threads; isolation between concurrent
/// transactions is the backend's job.
pub trait TransactionalKeyValueStore: Send + Sync {
    type Txn<'a>: KvTransaction
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Txn<'_>, StoreError>;
}
