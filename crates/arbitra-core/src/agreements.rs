//! Escrow agreement lifecycle
//!
//! ```text
//! Active ──release──────────▶ Resolved
//!   │  └──claim_expired────▶ Expired
//!   └──mark_disputed──▶ Disputed ──consensus / split──▶ Resolved
//! ```
//!
//! The agreement's derived address is also its custody account. Every
//! transition re-checks the current status inside the same write-locked
//! operation that changes it.

use arbitra_crypto::{agreement_address, dispute_pool_address, MembershipProof};
use arbitra_ledger::{EntryReason, Transfer};
use arbitra_types::{
    AccountId, Agreement, AgreementStatus, Asset, EntityType, ProtocolError, ProtocolEvent, Result,
};
use tracing::info;

use crate::reputation::Settlement;
use crate::state::{bps_of, Events, ProtocolState};
use crate::trust::dispute_cost_multiplier;

/// Parameters for a new agreement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAgreement {
    pub agent: AccountId,
    pub counterpart: AccountId,
    pub amount: u64,
    pub time_lock_seconds: u64,
    pub transaction_id: String,
    pub asset: Asset,
    /// Deny-list proofs to check against the parties
    pub screening: Vec<MembershipProof>,
}

impl CreateAgreement {
    pub fn native(
        agent: AccountId,
        counterpart: AccountId,
        amount: u64,
        time_lock_seconds: u64,
        transaction_id: impl Into<String>,
    ) -> Self {
        Self {
            agent,
            counterpart,
            amount,
            time_lock_seconds,
            transaction_id: transaction_id.into(),
            asset: Asset::Native,
            screening: Vec::new(),
        }
    }

    pub fn with_screening(mut self, proofs: Vec<MembershipProof>) -> Self {
        self.screening = proofs;
        self
    }

    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.asset = asset;
        self
    }
}

fn correlation(key: &AccountId) -> String {
    format!("agreement:{}", key.short())
}

impl ProtocolState {
    /// The agreement, if it sits in `from` and the status table permits
    /// moving it to `to`
    pub(crate) fn agreement_for_transition(
        &self,
        key: &AccountId,
        from: AgreementStatus,
        to: AgreementStatus,
        operation: &'static str,
    ) -> Result<&Agreement> {
        let agreement = self.agreement_ref(key)?;
        if agreement.status != from || !agreement.status.can_transition_to(to) {
            return Err(ProtocolError::InvalidStateTransition {
                current: agreement.status,
                operation,
            });
        }
        Ok(agreement)
    }

    /// Lock funds and charge the agreement fee. Returns the agreement key.
    pub(crate) fn create_agreement(
        &mut self,
        params: CreateAgreement,
        now: i64,
        events: &mut Events,
    ) -> Result<AccountId> {
        self.ensure_active()?;
        let s = &self.settings;

        if params.amount == 0 {
            return Err(ProtocolError::AmountZero);
        }
        if params.amount > s.max_agreement_amount {
            return Err(ProtocolError::AmountTooLarge {
                amount: params.amount,
                max: s.max_agreement_amount,
            });
        }
        let txid_len = params.transaction_id.len();
        if txid_len == 0 || txid_len > s.max_transaction_id_len {
            return Err(ProtocolError::InvalidTransactionIdLength {
                len: txid_len,
                max: s.max_transaction_id_len,
            });
        }
        let time_lock = i64::try_from(params.time_lock_seconds).unwrap_or(i64::MAX);
        if time_lock < s.min_time_lock_secs || time_lock > s.max_time_lock_secs {
            return Err(ProtocolError::InvalidTimeLock {
                seconds: time_lock,
                min: s.min_time_lock_secs,
                max: s.max_time_lock_secs,
            });
        }

        let agent = self
            .agents
            .get(&params.agent)
            .ok_or_else(|| ProtocolError::AgentNotFound {
                owner: params.agent.to_hex(),
            })?;
        if !agent.is_active {
            return Err(ProtocolError::AgentInactive {
                owner: params.agent.to_hex(),
            });
        }
        self.screen(&[params.agent, params.counterpart], &params.screening)?;

        let (key, bump) = agreement_address(&params.agent, &params.transaction_id);
        if self.agreements.contains_key(&key) {
            return Err(ProtocolError::AgreementAlreadyExists {
                transaction_id: params.transaction_id,
            });
        }

        let fee = bps_of(params.amount, self.config.agreement_fee_bps)?;
        // The fee counter is in native base units; external fees stay visible
        // as the treasury's balance of that asset
        let total_fees = match params.asset {
            Asset::Native => self.fees_after(fee)?,
            Asset::External(_) => self.config.total_fees_collected,
        };
        let legs = [
            Transfer::new(params.agent, key, params.asset, params.amount, EntryReason::EscrowLock),
            Transfer::new(params.agent, self.config.treasury, params.asset, fee, EntryReason::Fee),
        ];
        self.book.post(&legs, &correlation(&key), now)?;
        self.config.total_fees_collected = total_fees;

        let expires_at = now.saturating_add(time_lock);
        let agreement = Agreement {
            agent: params.agent,
            counterpart: params.counterpart,
            amount: params.amount,
            status: AgreementStatus::Active,
            created_at: now,
            expires_at,
            transaction_id: params.transaction_id.clone(),
            asset: params.asset,
            quality_score: None,
            refund_percentage: None,
            disputed_by: None,
            disputed_at: None,
            resolved_at: None,
            bump,
        };
        self.agreements.insert(key, agreement);
        self.agreements_by_agent
            .entry(params.agent)
            .or_default()
            .insert(key);
        if let Some(agent) = self.agents.get_mut(&params.agent) {
            agent.last_active = now;
        }

        info!(
            agreement = %key.short(),
            agent = %params.agent.short(),
            counterpart = %params.counterpart.short(),
            amount = params.amount,
            fee,
            asset = %params.asset,
            expires_at,
            "agreement created"
        );
        events.push(ProtocolEvent::AgreementInitialized {
            agreement: key,
            agent: params.agent,
            counterpart: params.counterpart,
            amount: params.amount,
            fee,
            transaction_id: params.transaction_id,
            expires_at,
            timestamp: now,
        });
        Ok(key)
    }

    /// Agent pays the full amount to the counterpart
    pub(crate) fn release(
        &mut self,
        caller: AccountId,
        key: AccountId,
        now: i64,
        events: &mut Events,
    ) -> Result<()> {
        self.ensure_active()?;
        if self.agreement_ref(&key)?.agent != caller {
            return Err(ProtocolError::NotAgentOwner);
        }
        let agreement = self
            .agreement_for_transition(&key, AgreementStatus::Active, AgreementStatus::Resolved, "release")?
            .clone();

        self.book.post(
            &[Transfer::new(
                key,
                agreement.counterpart,
                agreement.asset,
                agreement.amount,
                EntryReason::EscrowRelease,
            )],
            &correlation(&key),
            now,
        )?;

        if let Some(record) = self.agreements.get_mut(&key) {
            record.status = AgreementStatus::Resolved;
            record.refund_percentage = Some(0);
            record.resolved_at = Some(now);
        }
        if let Some(agent) = self.agents.get_mut(&agreement.agent) {
            agent.total_escrows = agent.total_escrows.saturating_add(1);
            agent.successful_escrows = agent.successful_escrows.saturating_add(1);
            agent.last_active = now;
            debug_assert!(agent.counters_consistent());
        }

        info!(agreement = %key.short(), amount = agreement.amount, "funds released");
        events.push(ProtocolEvent::FundsReleased {
            agreement: key,
            counterpart: agreement.counterpart,
            amount: agreement.amount,
            timestamp: now,
        });

        let settled = Settlement::undisputed(0);
        self.settle_reputation(&key, &agreement.agent, EntityType::Agent, settled, now, events);
        self.settle_reputation(&key, &agreement.counterpart, EntityType::Counterpart, settled, now, events);
        Ok(())
    }

    /// Either party disputes before expiry, paying the dispute fee into the
    /// agreement's dispute pool. The base part of the fee scales with the
    /// filer's dispute rate. Returns the consensus deadline.
    pub(crate) fn mark_disputed(
        &mut self,
        caller: AccountId,
        key: AccountId,
        now: i64,
        events: &mut Events,
    ) -> Result<i64> {
        self.ensure_active()?;
        if !self.agreement_ref(&key)?.is_party(&caller) {
            return Err(ProtocolError::NotAgreementParty);
        }
        let agreement = self
            .agreement_for_transition(&key, AgreementStatus::Active, AgreementStatus::Disputed, "dispute")?
            .clone();
        if agreement.is_expired_at(now) {
            return Err(ProtocolError::DisputeWindowClosed {
                expires_at: agreement.expires_at,
            });
        }

        let multiplier = self
            .reputations
            .get(&caller)
            .map(|rep| dispute_cost_multiplier(rep.disputes_filed, rep.total_transactions))
            .unwrap_or(1);
        let variable_fee = bps_of(agreement.amount, self.config.dispute_fee_bps)?;
        let dispute_fee = self
            .config
            .dispute_base_fee
            .checked_mul(multiplier)
            .and_then(|base| base.checked_add(variable_fee))
            .ok_or(ProtocolError::FeeOverflow)?;
        let (pool, _) = dispute_pool_address(&key);
        self.book.post(
            &[Transfer::native(caller, pool, dispute_fee, EntryReason::DisputeFee)],
            &correlation(&key),
            now,
        )?;

        if let Some(record) = self.agreements.get_mut(&key) {
            record.status = AgreementStatus::Disputed;
            record.disputed_by = Some(caller);
            record.disputed_at = Some(now);
        }
        if let Some(agent) = self.agents.get_mut(&agreement.agent) {
            agent.total_escrows = agent.total_escrows.saturating_add(1);
            agent.disputed_escrows = agent.disputed_escrows.saturating_add(1);
            agent.last_active = now;
        }
        let filer_type = if caller == agreement.agent {
            EntityType::Agent
        } else {
            EntityType::Counterpart
        };
        self.record_dispute_filed(&key, &caller, filer_type, now);
        let deadline = self.open_round(key, agreement.amount, now);

        info!(
            agreement = %key.short(),
            disputed_by = %caller.short(),
            respondent = %agreement.other_party(&caller).short(),
            dispute_fee,
            multiplier,
            deadline,
            "agreement disputed"
        );
        events.push(ProtocolEvent::DisputeMarked {
            agreement: key,
            disputed_by: caller,
            dispute_fee,
            deadline,
            timestamp: now,
        });
        Ok(deadline)
    }

    /// Return an undisputed, expired agreement's funds to the agent
    pub(crate) fn claim_expired(
        &mut self,
        caller: AccountId,
        key: AccountId,
        now: i64,
        events: &mut Events,
    ) -> Result<u64> {
        self.ensure_active()?;
        if !self.agreement_ref(&key)?.is_party(&caller) {
            return Err(ProtocolError::NotAgreementParty);
        }
        let agreement = self
            .agreement_for_transition(&key, AgreementStatus::Active, AgreementStatus::Expired, "claim expired")?
            .clone();
        if !agreement.is_expired_at(now) {
            return Err(ProtocolError::NotExpired {
                expires_at: agreement.expires_at,
                now,
            });
        }

        self.book.post(
            &[Transfer::new(
                key,
                agreement.agent,
                agreement.asset,
                agreement.amount,
                EntryReason::EscrowRefund,
            )],
            &correlation(&key),
            now,
        )?;
        if let Some(record) = self.agreements.get_mut(&key) {
            record.status = AgreementStatus::Expired;
            record.resolved_at = Some(now);
        }

        info!(agreement = %key.short(), claimed_by = %caller.short(), amount = agreement.amount, "expired escrow claimed");
        events.push(ProtocolEvent::ExpiredEscrowClaimed {
            agreement: key,
            claimed_by: caller,
            amount: agreement.amount,
            timestamp: now,
        });
        Ok(agreement.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ProtocolSettings;
    use arbitra_types::{AgentType, BASE_UNITS_PER_UNIT};

    const UNIT: u64 = BASE_UNITS_PER_UNIT;
    const HOUR: u64 = 3_600;

    fn acct(b: u8) -> AccountId {
        AccountId::new([b; 32])
    }

    /// Admin 1, treasury 2, agent 10 (registered), counterpart 11
    fn setup() -> ProtocolState {
        let mut state = ProtocolState::new(acct(1), acct(2), ProtocolSettings::default(), 0).unwrap();
        for who in [acct(10), acct(11)] {
            state.book.deposit(&who, Asset::Native, 50 * UNIT, "fund", 0).unwrap();
        }
        let mut events = Vec::new();
        state
            .register_agent(acct(10), "agent", AgentType::Service, UNIT, 0, &mut events)
            .unwrap();
        state
    }

    fn create(state: &mut ProtocolState, txid: &str, now: i64) -> Result<AccountId> {
        let mut events = Vec::new();
        state.create_agreement(CreateAgreement::native(acct(10), acct(11), UNIT, HOUR, txid), now, &mut events)
    }

    #[test]
    fn test_create_locks_amount_and_fee() {
        let mut state = setup();
        let before = state.book.native_balance(&acct(10));
        let key = create(&mut state, "tx-1", 100).unwrap();

        let agreement = state.agreement(&key).unwrap();
        assert_eq!(agreement.status, AgreementStatus::Active);
        assert_eq!(agreement.expires_at, 100 + HOUR as i64);
        assert_eq!(state.book.native_balance(&key), UNIT);
        // 10 bps
        assert_eq!(state.book.native_balance(&acct(10)), before - UNIT - 1_000_000);
        assert_eq!(key, agreement_address(&acct(10), "tx-1").0);
    }

    #[test]
    fn test_create_validation() {
        let mut state = setup();
        let mut events = Vec::new();
        let mut params = CreateAgreement::native(acct(10), acct(11), 0, HOUR, "tx");
        assert_eq!(
            state.create_agreement(params.clone(), 0, &mut events),
            Err(ProtocolError::AmountZero)
        );
        params.amount = 2_000 * UNIT;
        assert!(matches!(
            state.create_agreement(params.clone(), 0, &mut events),
            Err(ProtocolError::AmountTooLarge { .. })
        ));
        params.amount = UNIT;
        params.transaction_id = "x".repeat(65);
        assert_eq!(
            state.create_agreement(params.clone(), 0, &mut events),
            Err(ProtocolError::InvalidTransactionIdLength { len: 65, max: 64 })
        );
        params.transaction_id = "tx".into();
        params.time_lock_seconds = 60;
        assert!(matches!(
            state.create_agreement(params.clone(), 0, &mut events),
            Err(ProtocolError::InvalidTimeLock { seconds: 60, .. })
        ));
        params.time_lock_seconds = u64::MAX;
        assert!(matches!(
            state.create_agreement(params.clone(), 0, &mut events),
            Err(ProtocolError::InvalidTimeLock { .. })
        ));
        params.time_lock_seconds = HOUR;
        params.agent = acct(11);
        assert!(matches!(
            state.create_agreement(params, 0, &mut events),
            Err(ProtocolError::AgentNotFound { .. })
        ));
        assert!(events.is_empty());
    }

    #[test]
    fn test_duplicate_transaction_id() {
        let mut state = setup();
        create(&mut state, "tx-1", 0).unwrap();
        assert_eq!(
            create(&mut state, "tx-1", 5),
            Err(ProtocolError::AgreementAlreadyExists {
                transaction_id: "tx-1".into()
            })
        );
        assert!(create(&mut state, "tx-2", 5).is_ok());
    }

    #[test]
    fn test_release_only_by_agent_once() {
        let mut state = setup();
        let key = create(&mut state, "tx-1", 0).unwrap();
        let mut events = Vec::new();

        assert_eq!(state.release(acct(11), key, 1, &mut events), Err(ProtocolError::NotAgentOwner));
        state.release(acct(10), key, 1, &mut events).unwrap();
        assert_eq!(
            state.release(acct(10), key, 2, &mut events),
            Err(ProtocolError::InvalidStateTransition {
                current: AgreementStatus::Resolved,
                operation: "release"
            })
        );

        assert_eq!(state.book.native_balance(&key), 0);
        assert_eq!(state.book.native_balance(&acct(11)), 51 * UNIT);
        let agent = state.agent(&acct(10)).unwrap();
        assert_eq!((agent.total_escrows, agent.successful_escrows), (1, 1));
        assert_eq!(state.reputation(&acct(11)).unwrap().total_transactions, 1);
    }

    #[test]
    fn test_dispute_window() {
        let mut state = setup();
        let key = create(&mut state, "tx-1", 0).unwrap();
        let mut events = Vec::new();

        assert_eq!(
            state.mark_disputed(acct(99), key, 1, &mut events),
            Err(ProtocolError::NotAgreementParty)
        );
        assert_eq!(
            state.mark_disputed(acct(11), key, HOUR as i64, &mut events),
            Err(ProtocolError::DisputeWindowClosed {
                expires_at: HOUR as i64
            })
        );

        let deadline = state.mark_disputed(acct(11), key, 10, &mut events).unwrap();
        assert_eq!(deadline, 10 + 604_800);

        let (pool, _) = dispute_pool_address(&key);
        // base 0.001 + 50 bps of 1 unit
        assert_eq!(state.book.native_balance(&pool), 1_000_000 + 5_000_000);
        let rep = state.reputation(&acct(11)).unwrap();
        assert_eq!((rep.disputes_filed, rep.total_transactions), (1, 1));
        let agent = state.agent(&acct(10)).unwrap();
        assert_eq!((agent.total_escrows, agent.disputed_escrows), (1, 1));
        assert!(state.round(&key).is_some());
    }

    #[test]
    fn test_dispute_fee_escalates_with_dispute_rate() {
        let mut state = setup();
        let mut events = Vec::new();
        let (base, variable) = (1_000_000, 5_000_000);

        // (filed, total) on record before filing, expected base multiplier
        let cases = [(0u64, 0u64, 1u64), (1, 5, 1), (2, 5, 2), (3, 5, 5), (4, 5, 10)];
        for (i, (filed, total, multiplier)) in cases.into_iter().enumerate() {
            let key = create(&mut state, &format!("tx-{}", i), 0).unwrap();
            if let Some(rep) = state.reputations.get_mut(&acct(11)) {
                rep.disputes_filed = filed;
                rep.total_transactions = total;
            }
            state.mark_disputed(acct(11), key, 1, &mut events).unwrap();

            let (pool, _) = dispute_pool_address(&key);
            assert_eq!(state.book.native_balance(&pool), base * multiplier + variable);
        }
    }

    #[test]
    fn test_external_asset_fee_stays_out_of_native_total() {
        let mut state = setup();
        let mint = Asset::External(acct(50));
        state.book.deposit(&acct(10), mint, 10 * UNIT, "fund", 0).unwrap();
        let before = state.config().total_fees_collected;
        let mut events = Vec::new();

        let params = CreateAgreement::native(acct(10), acct(11), UNIT, HOUR, "tx-ext").with_asset(mint);
        let key = state.create_agreement(params, 0, &mut events).unwrap();

        assert_eq!(state.book.balance(&key, &mint), UNIT);
        assert_eq!(state.book.balance(&acct(2), &mint), 1_000_000);
        assert_eq!(state.config().total_fees_collected, before);

        create(&mut state, "tx-native", 0).unwrap();
        assert_eq!(state.config().total_fees_collected, before + 1_000_000);
    }

    #[test]
    fn test_disputed_agreement_cannot_be_released_or_claimed() {
        let mut state = setup();
        let key = create(&mut state, "tx-1", 0).unwrap();
        let mut events = Vec::new();
        state.mark_disputed(acct(11), key, 1, &mut events).unwrap();

        assert_eq!(
            state.release(acct(10), key, 2, &mut events),
            Err(ProtocolError::InvalidStateTransition {
                current: AgreementStatus::Disputed,
                operation: "release"
            })
        );
        assert_eq!(
            state.mark_disputed(acct(10), key, 2, &mut events),
            Err(ProtocolError::InvalidStateTransition {
                current: AgreementStatus::Disputed,
                operation: "dispute"
            })
        );
        assert_eq!(
            state.claim_expired(acct(10), key, HOUR as i64, &mut events),
            Err(ProtocolError::InvalidStateTransition {
                current: AgreementStatus::Disputed,
                operation: "claim expired"
            })
        );
    }

    #[test]
    fn test_claim_expired() {
        let mut state = setup();
        let key = create(&mut state, "tx-1", 0).unwrap();
        let mut events = Vec::new();
        let expires_at = HOUR as i64;

        assert_eq!(
            state.claim_expired(acct(11), key, expires_at - 1, &mut events),
            Err(ProtocolError::NotExpired {
                expires_at,
                now: expires_at - 1
            })
        );
        let before = state.book.native_balance(&acct(10));
        assert_eq!(state.claim_expired(acct(11), key, expires_at, &mut events).unwrap(), UNIT);
        assert_eq!(state.book.native_balance(&acct(10)), before + UNIT);
        assert_eq!(state.agreement(&key).unwrap().status, AgreementStatus::Expired);
        assert!(matches!(
            state.claim_expired(acct(10), key, expires_at + 1, &mut events),
            Err(ProtocolError::InvalidStateTransition { .. })
        ));
        assert!(state.reputation(&acct(10)).is_none());
    }

    #[test]
    fn test_open_agreements_block_deactivation() {
        let mut state = setup();
        let key = create(&mut state, "tx-1", 0).unwrap();
        let mut events = Vec::new();

        assert_eq!(
            state.deactivate_agent(acct(10), 1, &mut events),
            Err(ProtocolError::AgentHasOpenAgreements { open: 1 })
        );
        state.release(acct(10), key, 2, &mut events).unwrap();
        assert!(state.deactivate_agent(acct(10), 3, &mut events).is_ok());
    }
}
