//! Account identity types for Arbitra
//!
//! Every participant, vault and record is addressed by a 32-byte account id.
//! Ids render as lowercase hex and serialize as hex strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 32-byte account address (wallet, record or vault)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// Length of an account id in bytes
    pub const LEN: usize = 32;

    /// Create from raw bytes
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The all-zero account (never a valid participant)
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex encoding of the id
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string
    pub fn from_hex(s: &str) -> Result<Self, AccountIdParseError> {
        let bytes = hex::decode(s).map_err(|e| AccountIdParseError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| AccountIdParseError::InvalidLength(v.len()))?;
        Ok(Self(arr))
    }

    /// Short form for logs
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.short())
    }
}

impl FromStr for AccountId {
    type Err = AccountIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 32]> for AccountId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for AccountId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Error parsing an account id from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountIdParseError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("account id must be 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// The asset an agreement is denominated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Asset {
    /// The runtime's native asset (stakes, bonds and rent are always native)
    Native,
    /// An externally issued asset, identified by its mint account
    External(AccountId),
}

impl Asset {
    /// Whether this is the native asset
    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "native"),
            Asset::External(mint) => write!(f, "ext:{}", mint.short()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let id = AccountId::new([7u8; 32]);
        let parsed: AccountId = id.to_hex().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_rejects_short_hex() {
        let err = AccountId::from_hex("abcd").unwrap_err();
        assert_eq!(err, AccountIdParseError::InvalidLength(2));
    }

    #[test]
    fn test_serializes_as_hex_string() {
        let id = AccountId::new([1u8; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_asset_display() {
        assert_eq!(Asset::Native.to_string(), "native");
        assert!(Asset::External(AccountId::new([0xab; 32])).to_string().starts_with("ext:abab"));
    }
}
