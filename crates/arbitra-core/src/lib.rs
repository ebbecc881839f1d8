//! Arbitra Core - Escrow agreements with oracle dispute resolution
//!
//! An agent locks funds for a counterpart under a time lock. The agent can
//! release them, either party can dispute before expiry, and anyone can
//! reclaim them for the agent once the lock has run out. Disputes are
//! settled by a panel of registered oracles whose signed quality scores
//! are averaged into a refund split.
//!
//! # Layout
//!
//! - [`ProtocolState`]: every record and the ledger book, mutated by
//!   validate-then-commit operations
//! - [`Protocol`]: the shared handle; one write lock per operation
//! - [`Dispatcher`]: decodes wire instructions and routes them
//! - [`ConsensusService`]: a task that serves oracle submissions and sweeps
//!   stalled rounds
//!
//! # Conservation
//!
//! Value only moves through `LedgerBook::post`, which applies all legs of
//! an operation or none of them, so the sum of balances changes only on
//! deposits and withdrawals.

mod admin;
mod agents;
mod agreements;
mod blacklist;
pub mod clock;
pub mod consensus;
pub mod dispatcher;
mod oracles;
pub mod protocol;
pub mod refund;
pub mod reputation;
pub mod service;
pub mod settings;
pub mod state;
pub mod trust;

pub use admin::FeeSchedule;
pub use agreements::CreateAgreement;
pub use clock::{Clock, ManualClock, SystemClock};
pub use consensus::{
    compute_consensus, required_submissions, ConsensusAttempt, ConsensusRound, ConsensusScore, OracleSubmission,
    RecoveryAction, RecoveryOutcome, Resolution, RoundStatus, Submission, SubmissionReceipt,
    SPLIT_EVENLY_REFUND_PERCENTAGE,
};
pub use dispatcher::{DispatchOutcome, Dispatcher, Envelope};
pub use protocol::Protocol;
pub use refund::{resolution, standard_bands, QualityBand, RefundCurve, RefundSplit};
pub use reputation::{dispute_outcome, DisputeOutcome, MAX_REPUTATION};
pub use service::{ConsensusHandle, ConsensusService, ServiceConfig, ServiceError};
pub use settings::ProtocolSettings;
pub use state::{ProtocolState, Vaults};
pub use trust::{dispute_cost_multiplier, trust_level, TrustLevel};

pub use arbitra_types::{ProtocolError, Result};
