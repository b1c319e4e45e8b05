//! # Depot Common
//!
//! Shared types, constants, and errors used across Challenge Depot components.
//!
//! ## Modules
//! - `types` - Wire types for the issuance and validation endpoints
//! - `error` - The depot error taxonomy
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod types;

pub use error::{BoxError, DepotError, Operation};
pub use types::*;
