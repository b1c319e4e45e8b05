//! Redis-backed store.
//!
//! Writes are queued into a `MULTI`/`EXEC` pipeline and applied together on
//! commit. [`KvTransaction::take`] runs as a single server-side script, so
//! concurrent consumers of one key cannot both see it. Namespaces are members
//! of a registry set; adding one is an idempotent `SADD`.
//!
//! Connections are kept on a small free-list and reused. A transaction that
//! is dropped without commit or rollback closes its connection instead.
//!
//! Durability depends on the server: run Redis with `appendonly yes` and
//! `appendfsync always` when it backs challenges.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use ::redis::{Client, Commands, Connection, ConnectionLike, Pipeline, Script};
use depot_common::constants::redis_keys::{ENTRY_PREFIX, NAMESPACE_REGISTRY};
use tracing::{debug, info};

use super::{KvTransaction, StoreError, TransactionalKeyValueStore};

const MAX_IDLE_CONNECTIONS: usize = 16;

/// KEYS[1] = namespace registry, KEYS[2] = entry key, ARGV[1] = namespace.
/// Replies `{namespace_present, value_or_nil}`.
const TAKE_SCRIPT: &str = r#"
if redis.call('SISMEMBER', KEYS[1], ARGV[1]) == 0 then
    return {0, false}
end
local value = redis.call('GET', KEYS[2])
if value then
    redis.call('DEL', KEYS[2])
end
return {1, value}
"#;

pub struct RedisStore {
    client: Client,
    idle: Mutex<Vec<Connection>>,
    take_script: Script,
}

impl RedisStore {
    /// Create a store for the given Redis URL and verify the server answers.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let mut conn = client.get_connection()?;
        ::redis::cmd("PING").query::<String>(&mut conn)?;

        info!("RedisStore connected");
        Ok(Self {
            client,
            idle: Mutex::new(vec![conn]),
            take_script: Script::new(TAKE_SCRIPT),
        })
    }

    fn checkout(&self) -> Result<Connection, StoreError> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(conn) = idle.pop() {
            if conn.is_open() {
                return Ok(conn);
            }
        }
        drop(idle);

        debug!("Opening new redis connection");
        Ok(self.client.get_connection()?)
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(conn);
        }
    }

    #[cfg(test)]
    fn idle_connections(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl TransactionalKeyValueStore for RedisStore {
    type Txn<'a>
        = RedisTxn<'a>
    where
        Self: 'a;

    fn begin(&self) -> Result<RedisTxn<'_>, StoreError> {
        let conn = self.checkout()?;
        let mut pipe = ::redis::pipe();
        pipe.atomic();
        Ok(RedisTxn {
            store: self,
            conn,
            pipe,
            queued: 0,
            watched: false,
            pending_namespaces: HashSet::new(),
        })
    }
}

/// Build the Redis key for an entry
pub(crate) fn entry_key(namespace: &str, key: &[u8]) -> Vec<u8> {
    let mut full = format!("{ENTRY_PREFIX}{namespace}:").into_bytes();
    full.extend_from_slice(key);
    full
}

pub struct RedisTxn<'a> {
    store: &'a RedisStore,
    conn: Connection,
    pipe: Pipeline,
    queued: usize,
    /// Whether `get` has put a WATCH on this connection
    watched: bool,
    /// Namespaces whose creation is queued in this transaction
    pending_namespaces: HashSet<String>,
}

impl RedisTxn<'_> {
    fn require_namespace(&mut self, namespace: &str) -> Result<(), StoreError> {
        if self.namespace_exists(namespace)? {
            Ok(())
        } else {
            Err(StoreError::NamespaceMissing(namespace.to_string()))
        }
    }
}

impl KvTransaction for RedisTxn<'_> {
    fn create_namespace(&mut self, namespace: &str) -> Result<bool, StoreError> {
        let existed = self.namespace_exists(namespace)?;
        // Unconditional so racing initializers both commit
        self.pipe.sadd(NAMESPACE_REGISTRY, namespace).ignore();
        self.queued += 1;
        self.pending_namespaces.insert(namespace.to_string());
        Ok(!existed)
    }

    fn namespace_exists(&mut self, namespace: &str) -> Result<bool, StoreError> {
        if self.pending_namespaces.contains(namespace) {
            return Ok(true);
        }
        let exists: bool = self.conn.sismember(NAMESPACE_REGISTRY, namespace)?;
        Ok(exists)
    }

    /// Reads are `WATCH`ed: commit fails with [`StoreError::Conflict`] if the
    /// key changes before `EXEC`.
    fn get(&mut self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.require_namespace(namespace)?;
        let full = entry_key(namespace, key);
        ::redis::cmd("WATCH").arg(&full).query::<()>(&mut self.conn)?;
        self.watched = true;
        let value: Option<Vec<u8>> = self.conn.get(&full)?;
        Ok(value)
    }

    fn put(&mut self, namespace: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.require_namespace(namespace)?;
        self.pipe.set(entry_key(namespace, key), value).ignore();
        self.queued += 1;
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &[u8]) -> Result<(), StoreError> {
        self.require_namespace(namespace)?;
        self.pipe.del(entry_key(namespace, key)).ignore();
        self.queued += 1;
        Ok(())
    }

    /// Applied immediately by the server; not undone by rollback.
    fn take(&mut self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let (present, value): (i64, Option<Vec<u8>>) = self
            .store
            .take_script
            .key(NAMESPACE_REGISTRY)
            .key(entry_key(namespace, key))
            .arg(namespace)
            .invoke(&mut self.conn)?;
        if present == 0 {
            return Err(StoreError::NamespaceMissing(namespace.to_string()));
        }
        Ok(value)
    }

    fn commit(self) -> Result<(), StoreError> {
        let RedisTxn {
            store,
            mut conn,
            pipe,
            queued,
            watched,
            ..
        } = self;

        if queued == 0 {
            if watched {
                ::redis::cmd("UNWATCH").query::<()>(&mut conn)?;
            }
            store.checkin(conn);
            return Ok(());
        }

        // EXEC answers nil when a watched key was touched
        let applied: Option<()> = pipe.query(&mut conn)?;
        store.checkin(conn);
        applied.ok_or(StoreError::Conflict)
    }

    fn rollback(self) -> Result<(), StoreError> {
        let RedisTxn {
            store,
            mut conn,
            watched,
            ..
        } = self;

        if watched {
            ::redis::cmd("UNWATCH").query::<()>(&mut conn)?;
        }
        store.checkin(conn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_key_layout() {
        assert_eq!(entry_key("scep_challenges", b"abc"), b"depot:ns:scep_challenges:abc".to_vec());
    }

    #[test]
    fn test_entry_key_keeps_raw_bytes() {
        let key = entry_key("ns", &[0xff, 0x00]);
        assert_eq!(&key[..9], b"depot:ns:");
        assert_eq!(&key[key.len() - 2..], &[0xff, 0x00]);
    }

    fn redis_url() -> String {
        std::env::var("REDIS_URL")
            .unwrap_or_else(|_| depot_common::constants::DEFAULT_REDIS_URL.to_string())
    }

    #[test]
    #[ignore = "requires a running Redis server (REDIS_URL)"]
    fn test_redis_put_get_delete() {
        let store = RedisStore::open(&redis_url()).unwrap();
        let ns = "depot_test_ns";

        let mut txn = store.begin().unwrap();
        txn.create_namespace(ns).unwrap();
        txn.put(ns, b"k", b"v").unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert_eq!(txn.get(ns, b"k").unwrap(), Some(b"v".to_vec()));
        txn.delete(ns, b"k").unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert_eq!(txn.get(ns, b"k").unwrap(), None);
        txn.rollback().unwrap();
    }

    #[test]
    #[ignore = "requires a running Redis server (REDIS_URL)"]
    fn test_redis_watch_conflict() {
        let store = RedisStore::open(&redis_url()).unwrap();
        let ns = "depot_test_conflict";

        let mut setup = store.begin().unwrap();
        setup.create_namespace(ns).unwrap();
        setup.put(ns, b"k", b"v").unwrap();
        setup.commit().unwrap();

        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        assert!(first.get(ns, b"k").unwrap().is_some());
        assert!(second.get(ns, b"k").unwrap().is_some());
        first.delete(ns, b"k").unwrap();
        second.delete(ns, b"k").unwrap();

        first.commit().unwrap();
        assert!(matches!(second.commit(), Err(StoreError::Conflict)));
    }

    #[test]
    #[ignore = "requires a running Redis server (REDIS_URL)"]
    fn test_redis_take_is_single_shot() {
        let store = RedisStore::open(&redis_url()).unwrap();
        let ns = "depot_test_take";

        let mut setup = store.begin().unwrap();
        setup.create_namespace(ns).unwrap();
        setup.put(ns, b"k", b"v").unwrap();
        setup.commit().unwrap();

        // Two open transactions both try to consume the key
        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        assert_eq!(first.take(ns, b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(second.take(ns, b"k").unwrap(), None);
        first.commit().unwrap();
        second.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert!(matches!(
            txn.take("depot_test_never_created", b"k"),
            Err(StoreError::NamespaceMissing(_))
        ));
        txn.rollback().unwrap();
    }

    #[test]
    #[ignore = "requires a running Redis server (REDIS_URL)"]
    fn test_redis_concurrent_create_namespace() {
        let store = RedisStore::open(&redis_url()).unwrap();
        let ns = "depot_test_create_race";

        // Both see the namespace absent, both queue SADD, both commit
        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        first.create_namespace(ns).unwrap();
        second.create_namespace(ns).unwrap();
        first.commit().unwrap();
        second.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert!(txn.namespace_exists(ns).unwrap());
        txn.rollback().unwrap();
    }

    #[test]
    #[ignore = "requires a running Redis server (REDIS_URL)"]
    fn test_redis_connections_are_reused() {
        let store = RedisStore::open(&redis_url()).unwrap();
        assert_eq!(store.idle_connections(), 1);

        for _ in 0..5 {
            let mut txn = store.begin().unwrap();
            txn.namespace_exists("depot_test_ns").unwrap();
            txn.commit().unwrap();
        }
        assert_eq!(store.idle_connections(), 1);

        // Abandoned transactions give their connection up
        drop(store.begin().unwrap());
        assert_eq!(store.idle_connections(), 0);
    }
}
