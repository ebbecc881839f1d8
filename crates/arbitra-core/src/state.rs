//! Protocol state
//!
//! All records, indexes, consensus rounds and balances live in one
//! `ProtocolState`. Operations are methods on it, split by concern across
//! the sibling modules. Each operation validates everything it needs first
//! and only then mutates, so a returned error means nothing was applied.
//! Events are collected into a caller-provided buffer and published by the
//! protocol handle after the operation returns `Ok`.

use std::collections::{BTreeSet, HashMap, HashSet};

use arbitra_crypto::{blacklist_address, config_address, find_address, oracle_registry_address};
use arbitra_ledger::LedgerBook;
use arbitra_types::{
    AccountId, AgentIdentity, Agreement, BlacklistRegistry, EntityReputation, OracleRegistry,
    ProtocolConfig, ProtocolError, ProtocolEvent, Result, BPS_DENOMINATOR,
};

use crate::consensus::ConsensusRound;
use crate::refund::RefundCurve;
use crate::settings::ProtocolSettings;

/// Events produced by one operation
pub(crate) type Events = Vec<ProtocolEvent>;

pub(crate) const ORACLE_REWARDS_SEED: &[u8] = b"oracle_rewards";

/// Reputation effects already applied for an (agreement, entity) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ReputationMark {
    /// Counted toward `total_transactions`
    Counted,
    DisputeFiled,
    /// Score, quality and outcome applied
    Settled,
}

/// Singleton record and vault addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vaults {
    pub config: AccountId,
    /// Oracle registry record; holds oracle bonds
    pub oracle_registry: AccountId,
    /// Holds accrued, unclaimed oracle rewards
    pub oracle_rewards: AccountId,
    pub blacklist: AccountId,
}

impl Vaults {
    fn derive() -> (Self, [u8; 3]) {
        let (config, config_bump) = config_address();
        let (oracle_registry, registry_bump) = oracle_registry_address();
        let (oracle_rewards, _) = find_address(&[ORACLE_REWARDS_SEED]);
        let (blacklist, blacklist_bump) = blacklist_address();
        (
            Self {
                config,
                oracle_registry,
                oracle_rewards,
                blacklist,
            },
            [config_bump, registry_bump, blacklist_bump],
        )
    }
}

/// The complete protocol state
#[derive(Debug)]
pub struct ProtocolState {
    pub(crate) settings: ProtocolSettings,
    pub(crate) curve: RefundCurve,
    pub(crate) vaults: Vaults,
    pub(crate) config: ProtocolConfig,
    pub(crate) registry: OracleRegistry,
    pub(crate) blacklist: BlacklistRegistry,
    /// Keyed by owner
    pub(crate) agents: HashMap<AccountId, AgentIdentity>,
    /// Keyed by derived agreement address
    pub(crate) agreements: HashMap<AccountId, Agreement>,
    pub(crate) agreements_by_agent: HashMap<AccountId, BTreeSet<AccountId>>,
    /// Keyed by entity
    pub(crate) reputations: HashMap<AccountId, EntityReputation>,
    pub(crate) reputation_marks: HashMap<AccountId, HashSet<(AccountId, ReputationMark)>>,
    /// Keyed by agreement; one per Disputed agreement
    pub(crate) rounds: HashMap<AccountId, ConsensusRound>,
    pub(crate) book: LedgerBook,
}

impl ProtocolState {
    /// Create config, oracle registry and blacklist together
    pub fn new(
        admin: AccountId,
        treasury: AccountId,
        settings: ProtocolSettings,
        now: i64,
    ) -> Result<Self> {
        settings.validate()?;
        let curve = RefundCurve::new(settings.refund_bands.clone())?;
        let (vaults, [config_bump, registry_bump, blacklist_bump]) = Vaults::derive();

        let config = ProtocolConfig {
            admin,
            treasury,
            agreement_fee_bps: settings.agreement_fee_bps,
            dispute_fee_bps: settings.dispute_fee_bps,
            dispute_base_fee: settings.dispute_base_fee,
            identity_fee: settings.identity_fee,
            total_fees_collected: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
            bump: config_bump,
        };
        let registry = OracleRegistry {
            admin,
            oracles: Vec::new(),
            min_consensus: settings.min_consensus,
            max_score_deviation: settings.max_score_deviation,
            violation_threshold: settings.violation_threshold,
            created_at: now,
            updated_at: now,
            bump: registry_bump,
        };
        let blacklist = BlacklistRegistry {
            authority: admin,
            root: [0u8; 32],
            leaf_count: 0,
            last_updated: now,
            bump: blacklist_bump,
        };

        Ok(Self {
            settings,
            curve,
            vaults,
            config,
            registry,
            blacklist,
            agents: HashMap::new(),
            agreements: HashMap::new(),
            agreements_by_agent: HashMap::new(),
            reputations: HashMap::new(),
            reputation_marks: HashMap::new(),
            rounds: HashMap::new(),
            book: LedgerBook::new(),
        })
    }

    // ========================================================================
    // Guards
    // ========================================================================

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.config.is_active {
            Ok(())
        } else {
            Err(ProtocolError::ProtocolPaused)
        }
    }

    pub(crate) fn require_admin(&self, caller: &AccountId) -> Result<()> {
        if *caller == self.config.admin {
            Ok(())
        } else {
            Err(ProtocolError::unauthorized("caller is not the protocol admin"))
        }
    }

    pub(crate) fn agreement_ref(&self, key: &AccountId) -> Result<&Agreement> {
        self.agreements
            .get(key)
            .ok_or_else(|| ProtocolError::AgreementNotFound { key: key.to_hex() })
    }

    /// Total fees after adding `fees`, checked before anything is applied
    pub(crate) fn fees_after(&self, fees: u64) -> Result<u64> {
        self.config
            .total_fees_collected
            .checked_add(fees)
            .ok_or(ProtocolError::ArithmeticOverflow)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn curve(&self) -> &RefundCurve {
        &self.curve
    }

    pub fn vaults(&self) -> &Vaults {
        &self.vaults
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn oracle_registry(&self) -> &OracleRegistry {
        &self.registry
    }

    pub fn blacklist(&self) -> &BlacklistRegistry {
        &self.blacklist
    }

    pub fn agent(&self, owner: &AccountId) -> Option<&AgentIdentity> {
        self.agents.get(owner)
    }

    pub fn agreement(&self, key: &AccountId) -> Option<&Agreement> {
        self.agreements.get(key)
    }

    pub fn reputation(&self, entity: &AccountId) -> Option<&EntityReputation> {
        self.reputations.get(entity)
    }

    pub fn round(&self, agreement: &AccountId) -> Option<&ConsensusRound> {
        self.rounds.get(agreement)
    }

    pub fn book(&self) -> &LedgerBook {
        &self.book
    }

    /// Agreements of an agent that are Active or Disputed
    pub fn open_agreements(&self, agent: &AccountId) -> Vec<AccountId> {
        self.agreements_by_agent
            .get(agent)
            .map(|keys| {
                keys.iter()
                    .filter(|k| {
                        self.agreements
                            .get(k)
                            .map(|a| !a.status.is_terminal())
                            .unwrap_or(false)
                    })
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// `amount * bps / 10000`, failing if the result does not fit
pub(crate) fn bps_of(amount: u64, bps: u16) -> Result<u64> {
    let value = amount as u128 * bps as u128 / BPS_DENOMINATOR as u128;
    u64::try_from(value).map_err(|_| ProtocolError::FeeOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_creates_singletons() {
        let admin = AccountId::new([1; 32]);
        let treasury = AccountId::new([2; 32]);
        let state = ProtocolState::new(admin, treasury, ProtocolSettings::default(), 100).unwrap();

        assert!(state.config().is_active);
        assert_eq!(state.config().treasury, treasury);
        assert_eq!(state.oracle_registry().admin, admin);
        assert_eq!(state.oracle_registry().min_consensus, 3);
        assert_eq!(state.blacklist().authority, admin);
        assert!(state.blacklist().is_empty());
        assert_ne!(state.vaults().oracle_registry, state.vaults().oracle_rewards);
    }

    #[test]
    fn test_invalid_settings_block_initialization() {
        let settings = ProtocolSettings {
            max_score_deviation: 150,
            ..Default::default()
        };
        assert!(ProtocolState::new(AccountId::new([1; 32]), AccountId::new([2; 32]), settings, 0).is_err());
    }

    #[test]
    fn test_bps_of() {
        assert_eq!(bps_of(1_000_000_000, 10).unwrap(), 1_000_000);
        assert_eq!(bps_of(u64::MAX, 10_000).unwrap(), u64::MAX);
        assert_eq!(bps_of(u64::MAX, u16::MAX), Err(ProtocolError::FeeOverflow));
    }
}
