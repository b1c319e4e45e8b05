//! Random source for challenge generation.

use depot_common::BoxError;
use rand::TryRngCore;
use rand::rngs::OsRng;

/// A cryptographically secure byte source that may fail
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), BoxError>;
}

/// The operating system CSPRNG
///
/// Errors from the OS are returned as-is; there is no fallback generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), BoxError> {
        OsRng.try_fill_bytes(buf)?;
        Ok(())
    }
}
