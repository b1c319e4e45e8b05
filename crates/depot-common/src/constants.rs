//! Shared constants for Challenge Depot components.

/// Number of random bytes drawn for each challenge (192 bits)
pub const CHALLENGE_BYTES: usize = 24;

/// Namespace holding SCEP challenges, separate from other host data
pub const DEFAULT_NAMESPACE: &str = "scep_challenges";

/// Default SQLite database file
pub const DEFAULT_DATABASE_PATH: &str = "depot.db";

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default depotd HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

/// Default per-request deadline applied by the HTTP layer (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default time a SQLite writer waits for the database lock (milliseconds)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Redis key layout
pub mod redis_keys {
    /// Set of namespaces created so far
    pub const NAMESPACE_REGISTRY: &str = "depot:namespaces";

    /// Entry key: depot:ns:{namespace}:{key}
    pub const ENTRY_PREFIX: &str = "depot:ns:";
}

/// SQLite table names
pub mod sqlite_tables {
    /// One row per created namespace
    pub const NAMESPACES: &str = "depot_namespaces";

    /// Keyed entries, scoped by namespace
    pub const ENTRIES: &str = "depot_entries";
}
