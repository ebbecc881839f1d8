//! Arbitra Crypto - Cryptographic primitives for the escrow protocol
//!
//! This crate provides:
//! - Hashing (SHA-256) and Merkle trees for the blacklist commitment
//! - Deterministic, off-curve address derivation for records and vaults
//! - Instruction selectors and record tags
//! - Oracle key pairs and score signatures (Ed25519)

pub mod hash;
pub mod address;
pub mod keys;
pub mod signature;

pub use hash::*;
pub use address::*;
pub use keys::*;
pub use signature::*;

use arbitra_types::ProtocolError;
use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

impl From<CryptoError> for ProtocolError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKeyFormat(reason) => ProtocolError::malformed(reason),
            CryptoError::SigningFailed(reason) | CryptoError::VerificationFailed(reason) => {
                ProtocolError::InvalidOracleSignature { oracle: reason }
            }
        }
    }
}
