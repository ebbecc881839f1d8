//! Error types for Arbitra
//!
//! Every failure is explicit and atomic: an operation that returns an error
//! has committed nothing.

use crate::records::AgreementStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for Arbitra operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Classification of a protocol error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input, rejected before any state is read
    Validation,
    /// The record is not in a state that permits the operation
    State,
    /// The caller may not perform the operation
    Authorization,
    /// Funds, stake or fee arithmetic do not allow the operation
    Economic,
    /// Oracle submissions do not (yet) yield an acceptable score
    Consensus,
    /// Encoded instruction or record could not be decoded
    Wire,
}

/// Arbitra protocol error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// Amount must be greater than zero
    #[error("Amount must be greater than zero")]
    AmountZero,

    /// Amount exceeds the configured maximum
    #[error("Amount {amount} exceeds maximum {max}")]
    AmountTooLarge { amount: u64, max: u64 },

    /// Agent name is empty or longer than allowed
    #[error("Name length {len} outside 1..={max}")]
    NameTooLong { len: usize, max: usize },

    /// Transaction id is empty or longer than allowed
    #[error("Transaction id length {len} outside 1..={max}")]
    InvalidTransactionIdLength { len: usize, max: usize },

    /// Quality score outside 0..=100
    #[error("Quality score {score} outside 0..=100")]
    InvalidQualityScore { score: u8 },

    /// Timelock outside the configured bounds
    #[error("Timelock {seconds}s outside {min}..={max}")]
    InvalidTimeLock { seconds: i64, min: i64, max: i64 },

    /// Oracle weight must be positive
    #[error("Oracle weight must be greater than zero")]
    InvalidOracleWeight,

    /// Fee in basis points above 10000
    #[error("Fee {bps} bps exceeds 10000")]
    InvalidFeeBps { bps: u16 },

    /// Incoherent protocol settings
    #[error("Invalid settings: {reason}")]
    InvalidSettings { reason: String },

    // ========================================================================
    // State Errors
    // ========================================================================

    /// Operation not permitted from the current agreement status
    #[error("Cannot {operation} agreement in status {current}")]
    InvalidStateTransition {
        current: AgreementStatus,
        operation: &'static str,
    },

    /// An agreement with this (agent, transaction id) exists already
    #[error("Agreement for transaction {transaction_id} already exists")]
    AgreementAlreadyExists { transaction_id: String },

    /// Agreement not found
    #[error("Agreement {key} not found")]
    AgreementNotFound { key: String },

    /// Agent still has Active or Disputed agreements
    #[error("Agent has {open} open agreements")]
    AgentHasOpenAgreements { open: usize },

    /// Agent not registered
    #[error("Agent {owner} not found")]
    AgentNotFound { owner: String },

    /// Agent registered already
    #[error("Agent {owner} already registered")]
    AgentAlreadyExists { owner: String },

    /// Agent is deactivated
    #[error("Agent {owner} is inactive")]
    AgentInactive { owner: String },

    /// Timelock has not passed yet
    #[error("Agreement expires at {expires_at}, now {now}")]
    NotExpired { expires_at: i64, now: i64 },

    /// Dispute filed after the timelock passed
    #[error("Dispute window closed at {expires_at}")]
    DisputeWindowClosed { expires_at: i64 },

    /// Protocol is paused
    #[error("Protocol is paused")]
    ProtocolPaused,

    /// Pause requested while paused
    #[error("Protocol is already paused")]
    AlreadyPaused,

    /// Unpause requested while active
    #[error("Protocol is not paused")]
    NotPaused,

    /// Oracle already submitted a score for this agreement
    #[error("Oracle {oracle} already submitted for this agreement")]
    DuplicateSubmission { oracle: String },

    /// Oracle registered already
    #[error("Oracle {oracle} already registered")]
    OracleAlreadyRegistered { oracle: String },

    /// Oracle registry at capacity
    #[error("Oracle registry full ({max} oracles)")]
    OracleRegistryFull { max: usize },

    /// Nothing accrued to claim
    #[error("No rewards to claim")]
    NoRewardsToClaim,

    // ========================================================================
    // Authorization Errors
    // ========================================================================

    /// Caller is not the administrator or authority
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Caller does not own the agent
    #[error("Caller is not the agent owner")]
    NotAgentOwner,

    /// Caller is neither agent nor counterpart
    #[error("Caller is not a party to the agreement")]
    NotAgreementParty,

    /// Oracle not in the registry
    #[error("Oracle {oracle} is not registered")]
    OracleNotRegistered { oracle: String },

    /// A party to the agreement is on the deny-list
    #[error("Party {account} is blacklisted")]
    CounterpartyBlacklisted { account: String },

    /// Oracle score signature did not verify
    #[error("Invalid oracle signature from {oracle}")]
    InvalidOracleSignature { oracle: String },

    // ========================================================================
    // Economic Errors
    // ========================================================================

    /// Stake below the protocol minimum
    #[error("Insufficient stake: required {required}, provided {provided}")]
    InsufficientStake { provided: u64, required: u64 },

    /// Fee computation overflowed
    #[error("Fee computation overflowed")]
    FeeOverflow,

    /// Account balance too low
    #[error("Insufficient funds in {account}: requested {requested}, available {available}")]
    InsufficientFunds {
        account: String,
        requested: u64,
        available: u64,
    },

    /// Generic arithmetic overflow
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    // ========================================================================
    // Consensus Errors
    // ========================================================================

    /// Too few submissions, or the round deadline passed
    #[error("Consensus not reached: {have} of {need} submissions")]
    ConsensusNotReached { have: usize, need: usize },

    /// Submitted scores disagree beyond the allowed spread
    #[error("Score spread {spread} exceeds maximum deviation {max}")]
    ScoreDeviationTooHigh { spread: u8, max: u8 },

    /// Scores stay sealed until the reveal delay after the first submission
    #[error("Scores are sealed until {reveal_at}, now {now}")]
    RevealDelayNotMet { reveal_at: i64, now: i64 },

    // ========================================================================
    // Wire Errors
    // ========================================================================

    /// Record bytes could not be decoded
    #[error("Malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// Selector does not match any instruction
    #[error("Unknown instruction selector {selector}")]
    UnknownInstruction { selector: String },

    /// Instruction is missing a referenced account
    #[error("Missing account at index {index} ({name})")]
    MissingAccount { index: usize, name: &'static str },

    /// Record tag does not match the expected record type
    #[error("Record tag mismatch: expected {expected}")]
    RecordTagMismatch { expected: &'static str },
}

impl ProtocolError {
    /// Create an unauthorized error
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    /// Create a malformed record error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }

    /// Create an invalid settings error
    pub fn invalid_settings(reason: impl Into<String>) -> Self {
        Self::InvalidSettings {
            reason: reason.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AmountZero
            | Self::AmountTooLarge { .. }
            | Self::NameTooLong { .. }
            | Self::InvalidTransactionIdLength { .. }
            | Self::InvalidQualityScore { .. }
            | Self::InvalidTimeLock { .. }
            | Self::InvalidOracleWeight
            | Self::InvalidFeeBps { .. }
            | Self::InvalidSettings { .. } => ErrorKind::Validation,

            Self::InvalidStateTransition { .. }
            | Self::AgreementAlreadyExists { .. }
            | Self::AgreementNotFound { .. }
            | Self::AgentHasOpenAgreements { .. }
            | Self::AgentNotFound { .. }
            | Self::AgentAlreadyExists { .. }
            | Self::AgentInactive { .. }
            | Self::NotExpired { .. }
            | Self::DisputeWindowClosed { .. }
            | Self::ProtocolPaused
            | Self::AlreadyPaused
            | Self::NotPaused
            | Self::DuplicateSubmission { .. }
            | Self::OracleAlreadyRegistered { .. }
            | Self::OracleRegistryFull { .. }
            | Self::NoRewardsToClaim => ErrorKind::State,

            Self::Unauthorized { .. }
            | Self::NotAgentOwner
            | Self::NotAgreementParty
            | Self::OracleNotRegistered { .. }
            | Self::CounterpartyBlacklisted { .. }
            | Self::InvalidOracleSignature { .. } => ErrorKind::Authorization,

            Self::InsufficientStake { .. }
            | Self::FeeOverflow
            | Self::InsufficientFunds { .. }
            | Self::ArithmeticOverflow => ErrorKind::Economic,

            Self::ConsensusNotReached { .. }
            | Self::ScoreDeviationTooHigh { .. }
            | Self::RevealDelayNotMet { .. } => ErrorKind::Consensus,

            Self::MalformedRecord { .. }
            | Self::UnknownInstruction { .. }
            | Self::MissingAccount { .. }
            | Self::RecordTagMismatch { .. } => ErrorKind::Wire,
        }
    }

    /// Whether the same call may succeed later without any other party acting.
    ///
    /// Consensus failures leave the agreement Disputed; resubmitting after more
    /// oracle scores arrive is the caller's decision.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::NotExpired { .. }
                | Self::ProtocolPaused
                | Self::ConsensusNotReached { .. }
                | Self::RevealDelayNotMet { .. }
        )
    }

    /// Get an error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AmountZero => "AMOUNT_ZERO",
            Self::AmountTooLarge { .. } => "AMOUNT_TOO_LARGE",
            Self::NameTooLong { .. } => "NAME_TOO_LONG",
            Self::InvalidTransactionIdLength { .. } => "INVALID_TRANSACTION_ID_LENGTH",
            Self::InvalidQualityScore { .. } => "INVALID_QUALITY_SCORE",
            Self::InvalidTimeLock { .. } => "INVALID_TIME_LOCK",
            Self::InvalidOracleWeight => "INVALID_ORACLE_WEIGHT",
            Self::InvalidFeeBps { .. } => "INVALID_FEE_BPS",
            Self::InvalidSettings { .. } => "INVALID_SETTINGS",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::AgreementAlreadyExists { .. } => "AGREEMENT_ALREADY_EXISTS",
            Self::AgreementNotFound { .. } => "AGREEMENT_NOT_FOUND",
            Self::AgentHasOpenAgreements { .. } => "AGENT_HAS_OPEN_AGREEMENTS",
            Self::AgentNotFound { .. } => "AGENT_NOT_FOUND",
            Self::AgentAlreadyExists { .. } => "AGENT_ALREADY_EXISTS",
            Self::AgentInactive { .. } => "AGENT_INACTIVE",
            Self::NotExpired { .. } => "NOT_EXPIRED",
            Self::DisputeWindowClosed { .. } => "DISPUTE_WINDOW_CLOSED",
            Self::ProtocolPaused => "PROTOCOL_PAUSED",
            Self::AlreadyPaused => "ALREADY_PAUSED",
            Self::NotPaused => "NOT_PAUSED",
            Self::DuplicateSubmission { .. } => "DUPLICATE_SUBMISSION",
            Self::OracleAlreadyRegistered { .. } => "ORACLE_ALREADY_REGISTERED",
            Self::OracleRegistryFull { .. } => "ORACLE_REGISTRY_FULL",
            Self::NoRewardsToClaim => "NO_REWARDS_TO_CLAIM",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::NotAgentOwner => "NOT_AGENT_OWNER",
            Self::NotAgreementParty => "NOT_AGREEMENT_PARTY",
            Self::OracleNotRegistered { .. } => "ORACLE_NOT_REGISTERED",
            Self::CounterpartyBlacklisted { .. } => "COUNTERPARTY_BLACKLISTED",
            Self::InvalidOracleSignature { .. } => "INVALID_ORACLE_SIGNATURE",
            Self::InsufficientStake { .. } => "INSUFFICIENT_STAKE",
            Self::FeeOverflow => "FEE_OVERFLOW",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::ArithmeticOverflow => "ARITHMETIC_OVERFLOW",
            Self::ConsensusNotReached { .. } => "CONSENSUS_NOT_REACHED",
            Self::ScoreDeviationTooHigh { .. } => "SCORE_DEVIATION_TOO_HIGH",
            Self::RevealDelayNotMet { .. } => "REVEAL_DELAY_NOT_MET",
            Self::MalformedRecord { .. } => "MALFORMED_RECORD",
            Self::UnknownInstruction { .. } => "UNKNOWN_INSTRUCTION",
            Self::MissingAccount { .. } => "MISSING_ACCOUNT",
            Self::RecordTagMismatch { .. } => "RECORD_TAG_MISMATCH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ProtocolError::AmountZero.kind(), ErrorKind::Validation);
        assert_eq!(
            ProtocolError::InvalidStateTransition {
                current: AgreementStatus::Resolved,
                operation: "release",
            }
            .kind(),
            ErrorKind::State
        );
        assert_eq!(ProtocolError::NotAgentOwner.kind(), ErrorKind::Authorization);
        assert_eq!(ProtocolError::FeeOverflow.kind(), ErrorKind::Economic);
        assert_eq!(
            ProtocolError::ScoreDeviationTooHigh { spread: 40, max: 15 }.kind(),
            ErrorKind::Consensus
        );
        assert_eq!(ProtocolError::malformed("short").kind(), ErrorKind::Wire);
    }

    #[test]
    fn test_error_codes() {
        let err = ProtocolError::InsufficientStake {
            provided: 1,
            required: 100_000_000,
        };
        assert_eq!(err.error_code(), "INSUFFICIENT_STAKE");
        assert!(err.to_string().contains("required 100000000"));
    }

    #[test]
    fn test_retriable_errors() {
        assert!(ProtocolError::ConsensusNotReached { have: 1, need: 3 }.is_retriable());
        assert!(ProtocolError::RevealDelayNotMet { reveal_at: 300, now: 10 }.is_retriable());
        assert!(!ProtocolError::AgreementAlreadyExists {
            transaction_id: "tx".to_string()
        }
        .is_retriable());
    }

    #[test]
    fn test_state_error_reports_current_status() {
        let err = ProtocolError::InvalidStateTransition {
            current: AgreementStatus::Disputed,
            operation: "release",
        };
        assert_eq!(err.to_string(), "Cannot release agreement in status Disputed");
    }
}
