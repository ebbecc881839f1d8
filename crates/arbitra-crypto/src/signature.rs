//! Oracle score signatures

use crate::keys::verifying_key;
use crate::{CryptoError, CryptoResult, KeyPair};
use arbitra_types::AccountId;
use ed25519_dalek::{Signature as Ed25519Signature, Signer, Verifier};

/// A detached Ed25519 signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// Sign a message
    pub fn sign(keypair: &KeyPair, message: &[u8]) -> CryptoResult<Self> {
        let signature = keypair
            .signing_key()
            .try_sign(message)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        Ok(Self(signature.to_bytes()))
    }

    /// Verify against the signer's account id
    pub fn verify(&self, signer: &AccountId, message: &[u8]) -> CryptoResult<bool> {
        let key = verifying_key(signer)?;
        let signature = Ed25519Signature::from_bytes(&self.0);
        Ok(key.verify(message, &signature).is_ok())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyFormat("signature must be 64 bytes".to_string()))?;
        Ok(Self(arr))
    }
}

/// Signable trait for types that can be signed
pub trait Signable {
    /// Get the bytes to sign
    fn signable_bytes(&self) -> Vec<u8>;
}

/// An oracle's quality assessment of one agreement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreAttestation<'a> {
    pub transaction_id: &'a str,
    pub score: u8,
}

impl Signable for ScoreAttestation<'_> {
    /// `"<transaction_id>:<score>"`
    fn signable_bytes(&self) -> Vec<u8> {
        format!("{}:{}", self.transaction_id, self.score).into_bytes()
    }
}

/// Sign any Signable type
pub fn sign<T: Signable>(keypair: &KeyPair, item: &T) -> CryptoResult<Signature> {
    Signature::sign(keypair, &item.signable_bytes())
}

/// Verify signature on any Signable type
pub fn verify<T: Signable>(signer: &AccountId, signature: &Signature, item: &T) -> CryptoResult<bool> {
    signature.verify(signer, &item.signable_bytes())
}

/// Sign an oracle score for a transaction
pub fn sign_score(keypair: &KeyPair, transaction_id: &str, score: u8) -> CryptoResult<Signature> {
    sign(keypair, &ScoreAttestation { transaction_id, score })
}

/// Verify an oracle score signature
pub fn verify_score(
    oracle: &AccountId,
    transaction_id: &str,
    score: u8,
    signature: &Signature,
) -> CryptoResult<bool> {
    verify(oracle, signature, &ScoreAttestation { transaction_id, score })
}
