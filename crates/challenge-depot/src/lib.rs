//! # Challenge Depot
//!
//! Durable, single-use SCEP challenge passwords.
//!
//! ```text
//! protocol handler ──issue_challenge()──▶ ChallengeDepot ──put──▶ store
//!                  ◀──"Tn8..."─────────┘
//! enrollee ─CSR(challengePassword)─▶ ChallengeMiddleware ─check_and_consume()─▶ ChallengeDepot
//! ```
//!
//! ## Modules
//! - `store` - Transactional key-value capability and its SQLite/Redis backends
//! - `depot` - Issuance and atomic check-and-consume
//! - `entropy` - Fallible CSPRNG source
//! - `csr` - Challenge-gated CSR signing

pub mod csr;
pub mod depot;
pub mod entropy;
pub mod store;

pub use csr::{ChallengeMiddleware, ChallengeValidator, CsrRequest, CsrSigner, NopCsrSigner, SignError, StaticChallenge};
pub use depot::{ChallengeAuthority, ChallengeDepot};
pub use depot_common::{DepotError, Operation};
pub use entropy::{EntropySource, OsEntropy};
pub use store::{KvTransaction, RedisStore, SqliteStore, StoreError, TransactionalKeyValueStore};
