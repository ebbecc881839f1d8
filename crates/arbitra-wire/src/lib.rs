//! Arbitra Wire - Binary encoding of instructions and records
//!
//! Instructions are an 8-byte selector followed by a little-endian payload.
//! Records are an 8-byte tag followed by fixed fields, length-prefixed
//! strings and a trailing bump byte. Every variable-length read is checked
//! against the remaining buffer before any byte is copied.

pub mod codec;
pub mod instruction;
pub mod layout;

pub use codec::{Reader, Writer};
pub use instruction::*;
pub use layout::*;

use arbitra_types::ProtocolError;
use thiserror::Error;

/// Longest string the decoder will accept, regardless of record type
pub const MAX_STRING_LEN: usize = 1024;

/// Wire decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("Unexpected end of buffer: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    #[error("String length {len} exceeds limit {max}")]
    LengthTooLarge { len: usize, max: usize },

    #[error("Invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    #[error("Invalid value {value} for {field}")]
    InvalidDiscriminant { field: &'static str, value: u8 },

    #[error("Unknown selector {0}")]
    UnknownSelector(String),

    #[error("Record tag mismatch: expected {expected}")]
    TagMismatch { expected: &'static str },

    #[error("{count} trailing bytes after payload")]
    TrailingBytes { count: usize },
}

pub type Result<T> = std::result::Result<T, WireError>;

impl From<WireError> for ProtocolError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::UnknownSelector(selector) => ProtocolError::UnknownInstruction { selector },
            WireError::TagMismatch { expected } => ProtocolError::RecordTagMismatch { expected },
            other => ProtocolError::malformed(other.to_string()),
        }
    }
}
