//! Protocol handle
//!
//! `Protocol` is the only way to reach a `ProtocolState`: it can only be
//! built by `initialize`, so config, registry and blacklist always exist
//! before any agreement. Every operation takes the write lock once; the
//! lock is the check-and-set that serializes racing callers. Events from a
//! committed operation are journaled before the lock is released, so the
//! journal order matches the commit order.

use std::sync::Arc;

use arbitra_audit::{AuditEntry, AuditLog, EventJournal};
use arbitra_crypto::{agreement_address, MembershipProof};
use arbitra_types::{
    AccountId, AgentIdentity, AgentType, Agreement, Asset, BlacklistRegistry, EntityReputation,
    OracleCategory, OracleRegistry, ProtocolConfig, ProtocolError, Result,
};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::admin::FeeSchedule;
use crate::agreements::CreateAgreement;
use crate::clock::{Clock, SystemClock};
use crate::consensus::{
    ConsensusRound, OracleSubmission, RecoveryAction, RecoveryOutcome, Resolution,
    SubmissionReceipt,
};
use crate::settings::ProtocolSettings;
use crate::state::{Events, ProtocolState};
use crate::trust::{trust_level, TrustLevel};

/// Shared, initialized protocol instance
pub struct Protocol {
    state: RwLock<ProtocolState>,
    clock: Arc<dyn Clock>,
    journal: EventJournal,
}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol").finish_non_exhaustive()
    }
}

impl Protocol {
    /// Create config, oracle registry and blacklist. The admin is also the
    /// initial blacklist authority.
    pub fn initialize(
        admin: AccountId,
        treasury: AccountId,
        settings: ProtocolSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let journal = EventJournal::new(settings.event_capacity);
        let state = ProtocolState::new(admin, treasury, settings, clock.now())?;
        tracing::info!(admin = %admin.short(), treasury = %treasury.short(), "protocol initialized");
        Ok(Self {
            state: RwLock::new(state),
            clock,
            journal,
        })
    }

    /// Initialize against the wall clock
    pub fn with_system_clock(
        admin: AccountId,
        treasury: AccountId,
        settings: ProtocolSettings,
    ) -> Result<Self> {
        Self::initialize(admin, treasury, settings, Arc::new(SystemClock))
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Run one operation under the write lock and publish its events
    async fn apply<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut ProtocolState, i64, &mut Events) -> Result<T>,
    {
        let mut state = self.state.write().await;
        let now = self.clock.now();
        let mut events = Events::new();
        let out = op(&mut *state, now, &mut events)?;
        for event in events {
            if let Err(e) = self.journal.append(event).await {
                warn!(error = %e, "failed to journal event");
            }
        }
        Ok(out)
    }

    // ========================================================================
    // Funding
    // ========================================================================

    /// Credit funds arriving from the external runtime
    pub async fn deposit(&self, account: AccountId, asset: Asset, amount: u64) -> Result<u64> {
        let mut state = self.state.write().await;
        let now = self.clock.now();
        let balance = state
            .book
            .deposit(&account, asset, amount, &format!("deposit:{}", account.short()), now)?;
        debug!(account = %account.short(), amount, balance, "deposit");
        Ok(balance)
    }

    pub async fn balance(&self, account: &AccountId, asset: &Asset) -> u64 {
        self.state.read().await.book.balance(account, asset)
    }

    // ========================================================================
    // Agents
    // ========================================================================

    pub async fn register_agent(
        &self,
        owner: AccountId,
        name: &str,
        agent_type: AgentType,
        stake_amount: u64,
    ) -> Result<()> {
        self.apply(|s, now, ev| s.register_agent(owner, name, agent_type, stake_amount, now, ev))
            .await
    }

    /// Returns the amount paid back to the owner
    pub async fn deactivate_agent(&self, owner: AccountId) -> Result<u64> {
        self.apply(|s, now, ev| s.deactivate_agent(owner, now, ev)).await
    }

    // ========================================================================
    // Agreements
    // ========================================================================

    pub async fn create_agreement(&self, params: CreateAgreement) -> Result<AccountId> {
        self.apply(|s, now, ev| s.create_agreement(params, now, ev)).await
    }

    pub async fn release(&self, caller: AccountId, agreement: AccountId) -> Result<()> {
        self.apply(|s, now, ev| s.release(caller, agreement, now, ev)).await
    }

    /// Returns the consensus deadline
    pub async fn mark_disputed(&self, caller: AccountId, agreement: AccountId) -> Result<i64> {
        self.apply(|s, now, ev| s.mark_disputed(caller, agreement, now, ev)).await
    }

    /// Returns the amount returned to the agent
    pub async fn claim_expired(&self, caller: AccountId, agreement: AccountId) -> Result<u64> {
        self.apply(|s, now, ev| s.claim_expired(caller, agreement, now, ev)).await
    }

    // ========================================================================
    // Oracles and consensus
    // ========================================================================

    pub async fn submit_score(&self, submission: OracleSubmission) -> Result<SubmissionReceipt> {
        self.apply(|s, now, ev| s.submit_score(submission, now, ev)).await
    }

    pub async fn finalize_dispute(&self, caller: AccountId, agreement: AccountId) -> Result<Resolution> {
        self.apply(|s, now, ev| s.finalize_dispute(caller, agreement, now, ev)).await
    }

    pub async fn recover_stalled_dispute(
        &self,
        admin: AccountId,
        agreement: AccountId,
        action: RecoveryAction,
    ) -> Result<RecoveryOutcome> {
        self.apply(|s, now, ev| s.recover_stalled_dispute(admin, agreement, action, now, ev))
            .await
    }

    /// Mark rounds past their deadline as stalled; returns their agreements
    pub async fn sweep_stalled(&self) -> Vec<AccountId> {
        match self.apply(|s, now, ev| Ok(s.sweep_stalled(now, ev))).await {
            Ok(stalled) => stalled,
            Err(e) => {
                warn!(error = %e, "stall sweep failed");
                Vec::new()
            }
        }
    }

    pub async fn add_oracle(
        &self,
        admin: AccountId,
        oracle: AccountId,
        category: OracleCategory,
        weight: u16,
    ) -> Result<()> {
        self.apply(|s, now, ev| s.add_oracle(admin, oracle, category, weight, now, ev))
            .await
    }

    /// Returns bond plus unclaimed rewards paid to the oracle
    pub async fn remove_oracle(&self, admin: AccountId, oracle: AccountId) -> Result<u64> {
        self.apply(|s, now, ev| s.remove_oracle(admin, oracle, now, ev)).await
    }

    pub async fn claim_oracle_rewards(&self, oracle: AccountId) -> Result<u64> {
        self.apply(|s, now, ev| s.claim_oracle_rewards(oracle, now, ev)).await
    }

    // ========================================================================
    // Blacklist
    // ========================================================================

    pub async fn add_blacklist_entries(
        &self,
        authority: AccountId,
        new_root: [u8; 32],
        new_leaf_count: u64,
    ) -> Result<()> {
        self.apply(|s, now, ev| s.add_blacklist_entries(authority, new_root, new_leaf_count, now, ev))
            .await
    }

    pub async fn remove_blacklist_entries(
        &self,
        authority: AccountId,
        new_root: [u8; 32],
        new_leaf_count: u64,
    ) -> Result<()> {
        self.apply(|s, now, ev| {
            s.remove_blacklist_entries(authority, new_root, new_leaf_count, now, ev)
        })
        .await
    }

    pub async fn check_membership(&self, proof: &MembershipProof) -> bool {
        self.state.read().await.check_membership(proof)
    }

    // ========================================================================
    // Administration
    // ========================================================================

    pub async fn pause(&self, admin: AccountId) -> Result<()> {
        self.apply(|s, now, ev| s.pause(admin, now, ev)).await
    }

    pub async fn unpause(&self, admin: AccountId) -> Result<()> {
        self.apply(|s, now, ev| s.unpause(admin, now, ev)).await
    }

    pub async fn transfer_admin(&self, admin: AccountId, new_admin: AccountId) -> Result<()> {
        self.apply(|s, now, ev| s.transfer_admin(admin, new_admin, now, ev)).await
    }

    pub async fn withdraw_treasury(
        &self,
        admin: AccountId,
        asset: Asset,
        amount: u64,
        to: AccountId,
    ) -> Result<()> {
        self.apply(|s, now, ev| s.withdraw_treasury(admin, asset, amount, to, now, ev))
            .await
    }

    pub async fn update_fees(&self, admin: AccountId, fees: FeeSchedule) -> Result<()> {
        self.apply(|s, now, ev| s.update_fees(admin, fees, now, ev)).await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Storage key of the agreement for (agent, transaction id)
    pub fn agreement_key(agent: &AccountId, transaction_id: &str) -> AccountId {
        agreement_address(agent, transaction_id).0
    }

    pub async fn agreement(&self, key: &AccountId) -> Option<Agreement> {
        let found = self.state.read().await.agreement(key).cloned();
        debug!(agreement = %key.short(), found = found.is_some(), "agreement lookup");
        found
    }

    pub async fn agent(&self, owner: &AccountId) -> Option<AgentIdentity> {
        self.state.read().await.agent(owner).cloned()
    }

    pub async fn reputation(&self, entity: &AccountId) -> Option<EntityReputation> {
        self.state.read().await.reputation(entity).cloned()
    }

    pub async fn round(&self, agreement: &AccountId) -> Option<ConsensusRound> {
        self.state.read().await.round(agreement).cloned()
    }

    pub async fn config(&self) -> ProtocolConfig {
        self.state.read().await.config().clone()
    }

    pub async fn oracle_registry(&self) -> OracleRegistry {
        self.state.read().await.oracle_registry().clone()
    }

    pub async fn blacklist(&self) -> BlacklistRegistry {
        self.state.read().await.blacklist().clone()
    }

    pub async fn open_agreements(&self, agent: &AccountId) -> Vec<AccountId> {
        self.state.read().await.open_agreements(agent)
    }

    /// Trust level of a registered agent
    pub async fn trust_level(&self, owner: &AccountId) -> Result<TrustLevel> {
        let state = self.state.read().await;
        let agent = state
            .agent(owner)
            .ok_or_else(|| ProtocolError::AgentNotFound {
                owner: owner.to_hex(),
            })?;
        Ok(trust_level(agent.reputation, agent.stake_amount))
    }

    /// Read-only access to the whole state
    pub async fn inspect<R>(&self, f: impl FnOnce(&ProtocolState) -> R) -> R {
        f(&*self.state.read().await)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Journaled events as they are committed
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEntry> {
        self.journal.subscribe()
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }
}
