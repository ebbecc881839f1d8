//! Protocol records
//!
//! The six persistent records of the protocol. Records never point at each
//! other; cross-record lookups go through keys into the protocol's keyed
//! stores.

use crate::account::{AccountId, Asset};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Agent Identity
// ============================================================================

/// Kind of performing agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentType {
    Trading,
    Service,
    Oracle,
    Custom,
}

impl AgentType {
    /// Wire discriminant
    pub fn as_u8(self) -> u8 {
        match self {
            AgentType::Trading => 0,
            AgentType::Service => 1,
            AgentType::Oracle => 2,
            AgentType::Custom => 3,
        }
    }

    /// Parse a wire discriminant
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AgentType::Trading),
            1 => Some(AgentType::Service),
            2 => Some(AgentType::Oracle),
            3 => Some(AgentType::Custom),
            _ => None,
        }
    }
}

/// A registered, staked performing agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub owner: AccountId,
    pub name: String,
    pub agent_type: AgentType,
    /// Mirrors the owner's reputation score (0..=1000)
    pub reputation: u64,
    pub stake_amount: u64,
    pub is_active: bool,
    pub created_at: i64,
    pub last_active: i64,
    pub total_escrows: u64,
    pub successful_escrows: u64,
    pub disputed_escrows: u64,
    pub bump: u8,
}

impl AgentIdentity {
    /// `successful_escrows + disputed_escrows <= total_escrows`
    pub fn counters_consistent(&self) -> bool {
        self.successful_escrows
            .checked_add(self.disputed_escrows)
            .map(|sum| sum <= self.total_escrows)
            .unwrap_or(false)
    }
}

// ============================================================================
// Agreement
// ============================================================================

/// Agreement lifecycle status
///
/// ```text
/// Active ──release──────▶ Resolved
///   │ └────claimExpired──▶ Expired
///   └──markDisputed──▶ Disputed ──resolve──▶ Resolved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgreementStatus {
    Active,
    Disputed,
    Resolved,
    Expired,
}

impl AgreementStatus {
    /// Check if a transition to `next` is permitted
    pub fn can_transition_to(self, next: AgreementStatus) -> bool {
        use AgreementStatus::*;
        match (self, next) {
            (Active, Resolved) | (Active, Disputed) | (Active, Expired) => true,
            (Disputed, Resolved) => true,
            (Active, Active)
            | (Disputed, Active)
            | (Disputed, Disputed)
            | (Disputed, Expired) => false,
            (Resolved, _) | (Expired, _) => false,
        }
    }

    /// Resolved and Expired records are immutable
    pub fn is_terminal(self) -> bool {
        match self {
            AgreementStatus::Active | AgreementStatus::Disputed => false,
            AgreementStatus::Resolved | AgreementStatus::Expired => true,
        }
    }

    /// Wire discriminant
    pub fn as_u8(self) -> u8 {
        match self {
            AgreementStatus::Active => 0,
            AgreementStatus::Disputed => 1,
            AgreementStatus::Resolved => 2,
            AgreementStatus::Expired => 3,
        }
    }

    /// Parse a wire discriminant
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AgreementStatus::Active),
            1 => Some(AgreementStatus::Disputed),
            2 => Some(AgreementStatus::Resolved),
            3 => Some(AgreementStatus::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgreementStatus::Active => write!(f, "Active"),
            AgreementStatus::Disputed => write!(f, "Disputed"),
            AgreementStatus::Resolved => write!(f, "Resolved"),
            AgreementStatus::Expired => write!(f, "Expired"),
        }
    }
}

/// One escrow agreement between an agent (depositor) and a counterpart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    pub agent: AccountId,
    pub counterpart: AccountId,
    pub amount: u64,
    pub status: AgreementStatus,
    pub created_at: i64,
    pub expires_at: i64,
    pub transaction_id: String,
    pub asset: Asset,
    pub quality_score: Option<u8>,
    pub refund_percentage: Option<u8>,
    pub disputed_by: Option<AccountId>,
    pub disputed_at: Option<i64>,
    pub resolved_at: Option<i64>,
    pub bump: u8,
}

impl Agreement {
    /// Whether `account` is the agent or the counterpart
    pub fn is_party(&self, account: &AccountId) -> bool {
        self.agent == *account || self.counterpart == *account
    }

    /// The other party
    pub fn other_party(&self, account: &AccountId) -> AccountId {
        if self.agent == *account {
            self.counterpart
        } else {
            self.agent
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

// ============================================================================
// Oracle Registry
// ============================================================================

/// Assessment category an oracle is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OracleCategory {
    General,
    Specialist,
    Custom,
}

impl OracleCategory {
    pub fn as_u8(self) -> u8 {
        match self {
            OracleCategory::General => 0,
            OracleCategory::Specialist => 1,
            OracleCategory::Custom => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(OracleCategory::General),
            1 => Some(OracleCategory::Specialist),
            2 => Some(OracleCategory::Custom),
            _ => None,
        }
    }
}

/// A registered oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleEntry {
    /// ed25519 public key of the oracle
    pub oracle: AccountId,
    pub category: OracleCategory,
    pub weight: u16,
    /// Bond held in the registry vault
    pub bond: u64,
    pub violation_count: u8,
    pub pending_rewards: u64,
    pub total_rewards: u64,
}

/// Registry of quality-assessment oracles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRegistry {
    pub admin: AccountId,
    /// Registration order is preserved
    pub oracles: Vec<OracleEntry>,
    pub min_consensus: u8,
    pub max_score_deviation: u8,
    /// Distance from consensus beyond which an oracle accrues a violation
    pub violation_threshold: u8,
    pub created_at: i64,
    pub updated_at: i64,
    pub bump: u8,
}

impl OracleRegistry {
    pub fn find(&self, oracle: &AccountId) -> Option<&OracleEntry> {
        self.oracles.iter().find(|o| o.oracle == *oracle)
    }

    pub fn find_mut(&mut self, oracle: &AccountId) -> Option<&mut OracleEntry> {
        self.oracles.iter_mut().find(|o| o.oracle == *oracle)
    }

    pub fn contains(&self, oracle: &AccountId) -> bool {
        self.find(oracle).is_some()
    }

    pub fn weight_of(&self, oracle: &AccountId) -> Option<u16> {
        self.find(oracle).map(|o| o.weight)
    }
}

// ============================================================================
// Entity Reputation
// ============================================================================

/// Role an entity's reputation was first recorded under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Agent,
    Counterpart,
}

impl EntityType {
    pub fn as_u8(self) -> u8 {
        match self {
            EntityType::Agent => 0,
            EntityType::Counterpart => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EntityType::Agent),
            1 => Some(EntityType::Counterpart),
            _ => None,
        }
    }
}

/// Long-term transaction and dispute statistics for one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReputation {
    pub entity: AccountId,
    pub entity_type: EntityType,
    pub total_transactions: u64,
    pub disputes_filed: u64,
    pub disputes_won: u64,
    pub disputes_partial: u64,
    pub disputes_lost: u64,
    /// Mean quality score over resolved disputes involving this entity
    pub average_quality_received: u8,
    /// Number of quality samples behind `average_quality_received`
    pub quality_samples: u64,
    /// 0..=1000
    pub reputation_score: u16,
    pub created_at: i64,
    pub last_updated: i64,
    pub bump: u8,
}

impl EntityReputation {
    /// `won + partial + lost <= filed <= total_transactions`
    pub fn counters_consistent(&self) -> bool {
        let outcomes = self
            .disputes_won
            .checked_add(self.disputes_partial)
            .and_then(|s| s.checked_add(self.disputes_lost));
        match outcomes {
            Some(outcomes) => {
                outcomes <= self.disputes_filed && self.disputes_filed <= self.total_transactions
            }
            None => false,
        }
    }
}

// ============================================================================
// Blacklist
// ============================================================================

/// Deny-list committed as a Merkle root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistRegistry {
    pub authority: AccountId,
    pub root: [u8; 32],
    pub leaf_count: u64,
    pub last_updated: i64,
    pub bump: u8,
}

impl BlacklistRegistry {
    /// An empty list has the zero root
    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }
}

// ============================================================================
// Protocol Config
// ============================================================================

/// Process-wide fee schedule and pause switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub admin: AccountId,
    pub treasury: AccountId,
    pub agreement_fee_bps: u16,
    pub dispute_fee_bps: u16,
    pub dispute_base_fee: u64,
    pub identity_fee: u64,
    /// Monotonically non-decreasing
    pub total_fees_collected: u64,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub bump: u8,
}
