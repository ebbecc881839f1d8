//! Oracle key management

use crate::{CryptoError, CryptoResult};
use arbitra_types::AccountId;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;

/// A key pair for signing oracle submissions
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create from an existing 32-byte secret
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Get the verifying key (public)
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// The account id of this key (its public key bytes)
    pub fn account_id(&self) -> AccountId {
        AccountId::new(self.verifying_key.to_bytes())
    }

    /// Get the public key as hex string
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.as_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_key_hex())
            .finish()
    }
}

/// Parse an account id as an Ed25519 verifying key
pub fn verifying_key(account: &AccountId) -> CryptoResult<VerifyingKey> {
    VerifyingKey::from_bytes(account.as_bytes())
        .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let keypair = KeyPair::generate();
        assert_eq!(keypair.public_key_hex().len(), 64);
        assert!(verifying_key(&keypair.account_id()).is_ok());
    }

    #[test]
    fn test_keypair_from_bytes() {
        let a = KeyPair::from_bytes(&[5; 32]);
        let b = KeyPair::from_bytes(&[5; 32]);
        assert_eq!(a.account_id(), b.account_id());
    }
}
