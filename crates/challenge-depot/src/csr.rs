//! Challenge-gated CSR signing.
//!
//! [`ChallengeMiddleware`] sits in front of any [`CsrSigner`] and only lets a
//! request through when its challenge password checks out. Validator errors
//! reject the request exactly like a wrong password; the cause goes to the
//! log, never to the requester.

use depot_common::DepotError;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::depot::ChallengeAuthority;

/// An enrollment request, as far as signing is concerned
#[derive(Debug, Clone, Default)]
pub struct CsrRequest {
    /// The challengePassword attribute from the CSR
    pub challenge_password: String,
    /// DER-encoded certificate signing request
    pub csr_der: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum SignError {
    /// Wrong, reused, or uncheckable challenge
    #[error("enrollment rejected")]
    ChallengeRejected,

    #[error("signer error: {0}")]
    Signer(String),
}

/// Signs a CSR, returning the DER-encoded certificate
pub trait CsrSigner: Send + Sync {
    fn sign_csr(&self, request: &CsrRequest) -> Result<Vec<u8>, SignError>;
}

/// Signer that issues nothing; for wiring and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct NopCsrSigner;

impl CsrSigner for NopCsrSigner {
    fn sign_csr(&self, _request: &CsrRequest) -> Result<Vec<u8>, SignError> {
        Ok(Vec::new())
    }
}

/// Decides whether a presented challenge password is acceptable
pub trait ChallengeValidator: Send + Sync {
    fn check_challenge(&self, candidate: &str) -> Result<bool, DepotError>;
}

/// Any challenge authority validates by consuming
impl<A: ChallengeAuthority + ?Sized> ChallengeValidator for A {
    fn check_challenge(&self, candidate: &str) -> Result<bool, DepotError> {
        self.check_and_consume(candidate)
    }
}

/// A fixed shared challenge password
///
/// Comparison is on SHA-256 digests, so it does not short-circuit on the
/// length of the common prefix.
pub struct StaticChallenge {
    digest: [u8; 32],
}

impl StaticChallenge {
    pub fn new(password: &str) -> Self {
        Self {
            digest: Sha256::digest(password.as_bytes()).into(),
        }
    }
}

impl ChallengeValidator for StaticChallenge {
    fn check_challenge(&self, candidate: &str) -> Result<bool, DepotError> {
        let presented: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        let diff = presented
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        Ok(diff == 0)
    }
}

/// Wraps a signer so that only requests with a valid challenge get signed
pub struct ChallengeMiddleware<V, S> {
    validator: V,
    next: S,
}

impl<V: ChallengeValidator, S: CsrSigner> ChallengeMiddleware<V, S> {
    pub fn new(validator: V, next: S) -> Self {
        Self { validator, next }
    }
}

impl<V: ChallengeValidator, S: CsrSigner> CsrSigner for ChallengeMiddleware<V, S> {
    fn sign_csr(&self, request: &CsrRequest) -> Result<Vec<u8>, SignError> {
        match self.validator.check_challenge(&request.challenge_password) {
            Ok(true) => self.next.sign_csr(request),
            Ok(false) => {
                debug!("Challenge did not match");
                Err(SignError::ChallengeRejected)
            }
            Err(e) => {
                warn!(error = ?e, operation = %e.operation(), "Challenge check failed");
                Err(SignError::ChallengeRejected)
            }
        }
    }
}
