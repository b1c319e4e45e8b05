//! SQLite-backed durable store.
//!
//! All namespaces share one entries table keyed by `(namespace, key)`.
//! Every transaction starts with `BEGIN IMMEDIATE`, which takes the database
//! write lock up front: a read-then-delete inside one transaction can never
//! interleave with another writer, in this process or any other.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use depot_common::constants::sqlite_tables::{ENTRIES, NAMESPACES};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use super::{KvTransaction, StoreError, TransactionalKeyValueStore};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open a database at the given path.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        // WAL keeps readers off the writer's back; FULL fsyncs every commit.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;
        Self::init_schema(&conn)?;

        info!(path = ?path, "SqliteStore opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {NAMESPACES} (
                 name TEXT PRIMARY KEY
             );
             CREATE TABLE IF NOT EXISTS {ENTRIES} (
                 namespace TEXT NOT NULL,
                 key       BLOB NOT NULL,
                 value     BLOB NOT NULL,
                 PRIMARY KEY (namespace, key)
             );"
        ))?;
        Ok(())
    }
}

#[cfg(test)]
impl SqliteStore {
    pub(crate) fn entry_count(&self, namespace: &str) -> i64 {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {ENTRIES} WHERE namespace = ?1"),
            params![namespace],
            |row| row.get(0),
        )
        .unwrap()
    }
}

impl TransactionalKeyValueStore for SqliteStore {
    type Txn<'a>
        = SqliteTxn<'a>
    where
        Self: 'a;

    fn begin(&self) -> Result<SqliteTxn<'_>, StoreError> {
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(poisoned) => {
                // The panicking holder's SqliteTxn rolled back while unwinding
                warn!("Recovering sqlite connection after a panicked transaction");
                self.conn.clear_poison();
                poisoned.into_inner()
            }
        };
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(SqliteTxn {
            conn,
            finished: false,
        })
    }
}

/// An open `BEGIN IMMEDIATE` transaction; rolls back on drop unless committed
pub struct SqliteTxn<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl SqliteTxn<'_> {
    fn require_namespace(&mut self, namespace: &str) -> Result<(), StoreError> {
        if self.namespace_exists(namespace)? {
            Ok(())
        } else {
            Err(StoreError::NamespaceMissing(namespace.to_string()))
        }
    }
}

#[cfg(test)]
impl SqliteTxn<'_> {
    pub(crate) fn drop_namespace(&mut self, namespace: &str) {
        self.conn
            .execute(&format!("DELETE FROM {NAMESPACES} WHERE name = ?1"), params![namespace])
            .unwrap();
    }
}

impl KvTransaction for SqliteTxn<'_> {
    fn create_namespace(&mut self, namespace: &str) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            &format!("INSERT OR IGNORE INTO {NAMESPACES} (name) VALUES (?1)"),
            params![namespace],
        )?;
        Ok(inserted > 0)
    }

    fn namespace_exists(&mut self, namespace: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM {NAMESPACES} WHERE name = ?1"),
                params![namespace],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get(&mut self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.require_namespace(namespace)?;
        let value = self
            .conn
            .query_row(
                &format!("SELECT value FROM {ENTRIES} WHERE namespace = ?1 AND key = ?2"),
                params![namespace, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&mut self, namespace: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.require_namespace(namespace)?;
        self.conn.execute(
            &format!("INSERT OR REPLACE INTO {ENTRIES} (namespace, key, value) VALUES (?1, ?2, ?3)"),
            params![namespace, key, value],
        )?;
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &[u8]) -> Result<(), StoreError> {
        self.require_namespace(namespace)?;
        let removed = self.conn.execute(
            &format!("DELETE FROM {ENTRIES} WHERE namespace = ?1 AND key = ?2"),
            params![namespace, key],
        )?;
        debug!(namespace, removed, "sqlite delete");
        Ok(())
    }

    fn take(&mut self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        // BEGIN IMMEDIATE already holds the write lock
        let value = self.get(namespace, key)?;
        if value.is_some() {
            self.delete(namespace, key)?;
        }
        Ok(value)
    }

    fn commit(mut self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for SqliteTxn<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "Failed to roll back abandoned sqlite transaction");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "test_ns";

    #[test]
    fn test_create_namespace_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();

        let mut txn = store.begin().unwrap();
        assert!(txn.create_namespace(NS).unwrap());
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert!(!txn.create_namespace(NS).unwrap());
        assert!(txn.namespace_exists(NS).unwrap());
        txn.commit().unwrap();
    }

    #[test]
    fn test_missing_namespace() {
        let store = SqliteStore::in_memory().unwrap();
        let mut txn = store.begin().unwrap();
        assert!(matches!(
            txn.get(NS, b"k"),
            Err(StoreError::NamespaceMissing(ns)) if ns == NS
        ));
        assert!(matches!(txn.put(NS, b"k", b"v"), Err(StoreError::NamespaceMissing(_))));
    }

    #[test]
    fn test_put_get_delete() {
        let store = SqliteStore::in_memory().unwrap();
        let mut txn = store.begin().unwrap();
        txn.create_namespace(NS).unwrap();
        txn.put(NS, b"k", b"v").unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert_eq!(txn.get(NS, b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(txn.get("other", b"k").ok(), None);
        txn.delete(NS, b"k").unwrap();
        assert_eq!(txn.get(NS, b"k").unwrap(), None);
        txn.commit().unwrap();
    }

    #[test]
    fn test_drop_rolls_back() {
        let store = SqliteStore::in_memory().unwrap();
        let mut txn = store.begin().unwrap();
        txn.create_namespace(NS).unwrap();
        txn.commit().unwrap();

        {
            let mut txn = store.begin().unwrap();
            txn.put(NS, b"k", b"v").unwrap();
        }

        let mut txn = store.begin().unwrap();
        assert_eq!(txn.get(NS, b"k").unwrap(), None);
        txn.rollback().unwrap();
    }

    #[test]
    fn test_take_removes_once() {
        let store = SqliteStore::in_memory().unwrap();
        let mut txn = store.begin().unwrap();
        txn.create_namespace(NS).unwrap();
        txn.put(NS, b"k", b"v").unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert_eq!(txn.take(NS, b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(txn.take(NS, b"k").unwrap(), None);
        txn.commit().unwrap();
        assert_eq!(store.entry_count(NS), 0);
    }

    #[test]
    fn test_begin_after_panicked_transaction() {
        let store = SqliteStore::in_memory().unwrap();
        let mut txn = store.begin().unwrap();
        txn.create_namespace(NS).unwrap();
        txn.commit().unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut txn = store.begin().unwrap();
            txn.put(NS, b"k", b"v").unwrap();
            panic!("handler crashed mid-transaction");
        }));
        assert!(outcome.is_err());

        let mut txn = store.begin().unwrap();
        assert_eq!(txn.get(NS, b"k").unwrap(), None);
        txn.put(NS, b"k2", b"v").unwrap();
        txn.commit().unwrap();
        assert!(!store.conn.is_poisoned());
        assert_eq!(store.entry_count(NS), 1);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let store = SqliteStore::in_memory().unwrap();
        let mut txn = store.begin().unwrap();
        txn.create_namespace("a").unwrap();
        txn.create_namespace("b").unwrap();
        txn.put("a", b"k", b"1").unwrap();
        assert_eq!(txn.get("b", b"k").unwrap(), None);
        txn.commit().unwrap();
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depot.db");

        {
            let store = SqliteStore::open(&path, Duration::from_millis(500)).unwrap();
            let mut txn = store.begin().unwrap();
            txn.create_namespace(NS).unwrap();
            txn.put(NS, b"k", b"v").unwrap();
            txn.commit().unwrap();
        }

        let store = SqliteStore::open(&path, Duration::from_millis(500)).unwrap();
        let mut txn = store.begin().unwrap();
        assert_eq!(txn.get(NS, b"k").unwrap(), Some(b"v".to_vec()));
        txn.commit().unwrap();
    }
}
