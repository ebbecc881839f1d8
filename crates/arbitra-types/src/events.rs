//! Protocol events
//!
//! Emitted after every committed state change. Indexers and notifiers
//! subscribe to these; the protocol never depends on anyone listening.
//! Timestamps are unix seconds from the protocol clock.

use crate::account::AccountId;
use crate::records::{AgentType, OracleCategory};
use serde::{Deserialize, Serialize};

/// Events emitted by the protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProtocolEvent {
    // ====================================================================
    // Agents
    // ====================================================================

    /// Agent registered with stake
    AgentCreated {
        owner: AccountId,
        name: String,
        agent_type: AgentType,
        stake_amount: u64,
        timestamp: i64,
    },

    /// Agent closed; stake and rent returned
    AgentDeactivated {
        owner: AccountId,
        returned: u64,
        timestamp: i64,
    },

    /// Agent stake reduced after an unfavorable resolution
    AgentSlashed {
        owner: AccountId,
        agreement: AccountId,
        amount: u64,
        remaining_stake: u64,
        reason: String,
        timestamp: i64,
    },

    /// Reputation record recomputed
    ReputationUpdated {
        entity: AccountId,
        old_score: u16,
        new_score: u16,
        timestamp: i64,
    },

    // ====================================================================
    // Agreements
    // ====================================================================

    /// Agreement created and funds locked
    AgreementInitialized {
        agreement: AccountId,
        agent: AccountId,
        counterpart: AccountId,
        amount: u64,
        fee: u64,
        transaction_id: String,
        expires_at: i64,
        timestamp: i64,
    },

    /// Agent released the full amount to the counterpart
    FundsReleased {
        agreement: AccountId,
        counterpart: AccountId,
        amount: u64,
        timestamp: i64,
    },

    /// A party disputed the agreement
    DisputeMarked {
        agreement: AccountId,
        disputed_by: AccountId,
        dispute_fee: u64,
        deadline: i64,
        timestamp: i64,
    },

    /// Funds split according to the consensus score
    DisputeResolved {
        agreement: AccountId,
        quality_score: Option<u8>,
        refund_percentage: u8,
        refund_amount: u64,
        payment_amount: u64,
        timestamp: i64,
    },

    /// Timelock passed without dispute; funds returned to the agent
    ExpiredEscrowClaimed {
        agreement: AccountId,
        claimed_by: AccountId,
        amount: u64,
        timestamp: i64,
    },

    // ====================================================================
    // Oracles
    // ====================================================================

    OracleScoreSubmitted {
        agreement: AccountId,
        oracle: AccountId,
        score: u8,
        submissions: usize,
        timestamp: i64,
    },

    /// Submissions disagreed beyond the allowed spread
    ConsensusRejected {
        agreement: AccountId,
        spread: u8,
        max_deviation: u8,
        timestamp: i64,
    },

    /// Deadline passed without enough submissions
    ConsensusStalled {
        agreement: AccountId,
        have: usize,
        need: usize,
        timestamp: i64,
    },

    OracleAdded {
        oracle: AccountId,
        category: OracleCategory,
        weight: u16,
        bond: u64,
        timestamp: i64,
    },

    OracleRemoved {
        oracle: AccountId,
        returned_bond: u64,
        reason: String,
        timestamp: i64,
    },

    OracleSlashed {
        oracle: AccountId,
        amount: u64,
        violations: u8,
        timestamp: i64,
    },

    OracleRewarded {
        oracle: AccountId,
        agreement: AccountId,
        amount: u64,
        timestamp: i64,
    },

    OracleRewardsClaimed {
        oracle: AccountId,
        amount: u64,
        timestamp: i64,
    },

    // ====================================================================
    // Administration
    // ====================================================================

    BlacklistUpdated {
        root: [u8; 32],
        leaf_count: u64,
        timestamp: i64,
    },

    ProtocolPaused {
        admin: AccountId,
        timestamp: i64,
    },

    ProtocolUnpaused {
        admin: AccountId,
        timestamp: i64,
    },

    AdminTransferred {
        old_admin: AccountId,
        new_admin: AccountId,
        timestamp: i64,
    },

    TreasuryWithdrawal {
        to: AccountId,
        amount: u64,
        timestamp: i64,
    },

    FeesUpdated {
        agreement_fee_bps: u16,
        dispute_fee_bps: u16,
        dispute_base_fee: u64,
        timestamp: i64,
    },
}

impl ProtocolEvent {
    /// Event name as used by indexers
    pub fn name(&self) -> &'static str {
        match self {
            Self::AgentCreated { .. } => "AgentCreated",
            Self::AgentDeactivated { .. } => "AgentDeactivated",
            Self::AgentSlashed { .. } => "AgentSlashed",
            Self::ReputationUpdated { .. } => "ReputationUpdated",
            Self::AgreementInitialized { .. } => "AgreementInitialized",
            Self::FundsReleased { .. } => "FundsReleased",
            Self::DisputeMarked { .. } => "DisputeMarked",
            Self::DisputeResolved { .. } => "DisputeResolved",
            Self::ExpiredEscrowClaimed { .. } => "ExpiredEscrowClaimed",
            Self::OracleScoreSubmitted { .. } => "OracleScoreSubmitted",
            Self::ConsensusRejected { .. } => "ConsensusRejected",
            Self::ConsensusStalled { .. } => "ConsensusStalled",
            Self::OracleAdded { .. } => "OracleAdded",
            Self::OracleRemoved { .. } => "OracleRemoved",
            Self::OracleSlashed { .. } => "OracleSlashed",
            Self::OracleRewarded { .. } => "OracleRewarded",
            Self::OracleRewardsClaimed { .. } => "OracleRewardsClaimed",
            Self::BlacklistUpdated { .. } => "BlacklistUpdated",
            Self::ProtocolPaused { .. } => "ProtocolPaused",
            Self::ProtocolUnpaused { .. } => "ProtocolUnpaused",
            Self::AdminTransferred { .. } => "AdminTransferred",
            Self::TreasuryWithdrawal { .. } => "TreasuryWithdrawal",
            Self::FeesUpdated { .. } => "FeesUpdated",
        }
    }

    /// Unix timestamp of the event
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::AgentCreated { timestamp, .. }
            | Self::AgentDeactivated { timestamp, .. }
            | Self::AgentSlashed { timestamp, .. }
            | Self::ReputationUpdated { timestamp, .. }
            | Self::AgreementInitialized { timestamp, .. }
            | Self::FundsReleased { timestamp, .. }
            | Self::DisputeMarked { timestamp, .. }
            | Self::DisputeResolved { timestamp, .. }
            | Self::ExpiredEscrowClaimed { timestamp, .. }
            | Self::OracleScoreSubmitted { timestamp, .. }
            | Self::ConsensusRejected { timestamp, .. }
            | Self::ConsensusStalled { timestamp, .. }
            | Self::OracleAdded { timestamp, .. }
            | Self::OracleRemoved { timestamp, .. }
            | Self::OracleSlashed { timestamp, .. }
            | Self::OracleRewarded { timestamp, .. }
            | Self::OracleRewardsClaimed { timestamp, .. }
            | Self::BlacklistUpdated { timestamp, .. }
            | Self::ProtocolPaused { timestamp, .. }
            | Self::ProtocolUnpaused { timestamp, .. }
            | Self::AdminTransferred { timestamp, .. }
            | Self::TreasuryWithdrawal { timestamp, .. }
            | Self::FeesUpdated { timestamp, .. } => *timestamp,
        }
    }
}
