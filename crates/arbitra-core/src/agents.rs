//! Agent identities and staking
//!
//! Stake and identity rent sit in the agent's derived vault until the agent
//! deactivates. Slashing moves stake from the vault to the treasury.

use arbitra_crypto::agent_address;
use arbitra_ledger::{EntryReason, Transfer};
use arbitra_types::{AccountId, AgentIdentity, AgentType, ProtocolError, ProtocolEvent, Result};
use tracing::info;

use crate::state::{bps_of, Events, ProtocolState};

impl ProtocolState {
    /// Register a staked agent, charging the identity fee
    pub(crate) fn register_agent(
        &mut self,
        owner: AccountId,
        name: &str,
        agent_type: AgentType,
        stake_amount: u64,
        now: i64,
        events: &mut Events,
    ) -> Result<()> {
        self.ensure_active()?;
        if name.is_empty() || name.len() > self.settings.max_name_len {
            return Err(ProtocolError::NameTooLong {
                len: name.len(),
                max: self.settings.max_name_len,
            });
        }
        if stake_amount < self.settings.min_agent_stake {
            return Err(ProtocolError::InsufficientStake {
                provided: stake_amount,
                required: self.settings.min_agent_stake,
            });
        }
        if self.agents.contains_key(&owner) {
            return Err(ProtocolError::AgentAlreadyExists {
                owner: owner.to_hex(),
            });
        }

        let (vault, bump) = agent_address(&owner);
        let identity_fee = self.config.identity_fee;
        let total_fees = self.fees_after(identity_fee)?;
        let legs = [
            Transfer::native(owner, vault, stake_amount, EntryReason::Stake),
            Transfer::native(owner, vault, self.settings.identity_rent, EntryReason::Stake),
            Transfer::native(owner, self.config.treasury, identity_fee, EntryReason::Fee),
        ];
        self.book.post(&legs, &format!("agent:{}", owner.short()), now)?;
        self.config.total_fees_collected = total_fees;

        let identity = AgentIdentity {
            owner,
            name: name.to_string(),
            agent_type,
            reputation: self.reputation_score(&owner) as u64,
            stake_amount,
            is_active: true,
            created_at: now,
            last_active: now,
            total_escrows: 0,
            successful_escrows: 0,
            disputed_escrows: 0,
            bump,
        };
        self.agents.insert(owner, identity);

        info!(owner = %owner.short(), name, stake_amount, "agent registered");
        events.push(ProtocolEvent::AgentCreated {
            owner,
            name: name.to_string(),
            agent_type,
            stake_amount,
            timestamp: now,
        });
        Ok(())
    }

    /// Close the identity and return everything left in its vault
    pub(crate) fn deactivate_agent(
        &mut self,
        owner: AccountId,
        now: i64,
        events: &mut Events,
    ) -> Result<u64> {
        if !self.agents.contains_key(&owner) {
            return Err(ProtocolError::AgentNotFound {
                owner: owner.to_hex(),
            });
        }
        let open = self.open_agreements(&owner).len();
        if open > 0 {
            return Err(ProtocolError::AgentHasOpenAgreements { open });
        }

        let (vault, _) = agent_address(&owner);
        let returned = self.book.native_balance(&vault);
        self.book.post(
            &[Transfer::native(vault, owner, returned, EntryReason::StakeReturn)],
            &format!("agent:{}", owner.short()),
            now,
        )?;
        self.agents.remove(&owner);

        info!(owner = %owner.short(), returned, "agent deactivated");
        events.push(ProtocolEvent::AgentDeactivated {
            owner,
            returned,
            timestamp: now,
        });
        Ok(returned)
    }

    /// Stake to slash for a given refund percentage, capped at the stake
    pub(crate) fn agent_slash_amount(&self, owner: &AccountId, refund_percentage: u8) -> Result<u64> {
        let stake = match self.agents.get(owner) {
            Some(agent) => agent.stake_amount,
            None => return Ok(0),
        };
        let full = bps_of(stake, self.settings.agent_slash_bps)?;
        let scaled = full as u128 * refund_percentage.min(100) as u128 / 100;
        Ok((scaled as u64).min(stake))
    }

    /// Leg moving slashed stake from the agent vault to the treasury
    pub(crate) fn agent_slash_leg(&self, owner: &AccountId, amount: u64) -> Transfer {
        let (vault, _) = agent_address(owner);
        Transfer::native(vault, self.config.treasury, amount, EntryReason::Slash)
    }

    /// Record a slash whose ledger leg has already been posted
    pub(crate) fn apply_agent_slash(
        &mut self,
        owner: &AccountId,
        agreement: &AccountId,
        amount: u64,
        reason: &str,
        now: i64,
        events: &mut Events,
    ) {
        if amount == 0 {
            return;
        }
        let Some(agent) = self.agents.get_mut(owner) else {
            return;
        };
        agent.stake_amount = agent.stake_amount.saturating_sub(amount);
        let remaining_stake = agent.stake_amount;

        info!(owner = %owner.short(), amount, remaining_stake, reason, "agent slashed");
        events.push(ProtocolEvent::AgentSlashed {
            owner: *owner,
            agreement: *agreement,
            amount,
            remaining_stake,
            reason: reason.to_string(),
            timestamp: now,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ProtocolSettings;
    use arbitra_types::{Asset, BASE_UNITS_PER_UNIT};

    fn acct(b: u8) -> AccountId {
        AccountId::new([b; 32])
    }

    fn funded_state(owner: AccountId) -> ProtocolState {
        let mut state = ProtocolState::new(acct(1), acct(2), ProtocolSettings::default(), 0).unwrap();
        state
            .book
            .deposit(&owner, Asset::Native, 10 * BASE_UNITS_PER_UNIT, "fund", 0)
            .unwrap();
        state
    }

    #[test]
    fn test_register_moves_stake_rent_and_fee() {
        let owner = acct(10);
        let mut state = funded_state(owner);
        let mut events = Vec::new();
        let stake = BASE_UNITS_PER_UNIT;

        state
            .register_agent(owner, "bot", AgentType::Service, stake, 1, &mut events)
            .unwrap();

        let (vault, _) = agent_address(&owner);
        let settings = ProtocolSettings::default();
        assert_eq!(state.book.native_balance(&vault), stake + settings.identity_rent);
        assert_eq!(state.book.native_balance(&acct(2)), settings.identity_fee);
        assert_eq!(state.config.total_fees_collected, settings.identity_fee);

        let agent = state.agent(&owner).unwrap();
        assert!(agent.is_active);
        assert_eq!(agent.reputation, 500);
        assert_eq!(agent.total_escrows, 0);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_register_validation() {
        let owner = acct(10);
        let mut state = funded_state(owner);
        let mut events = Vec::new();

        let long = "x".repeat(33);
        assert_eq!(
            state.register_agent(owner, &long, AgentType::Trading, BASE_UNITS_PER_UNIT, 1, &mut events),
            Err(ProtocolError::NameTooLong { len: 33, max: 32 })
        );
        assert!(matches!(
            state.register_agent(owner, "", AgentType::Trading, BASE_UNITS_PER_UNIT, 1, &mut events),
            Err(ProtocolError::NameTooLong { len: 0, .. })
        ));
        assert_eq!(
            state.register_agent(owner, "bot", AgentType::Trading, 1, 1, &mut events),
            Err(ProtocolError::InsufficientStake {
                provided: 1,
                required: 100_000_000
            })
        );
        assert!(events.is_empty());
        assert_eq!(state.book.entry_count(), 1);
    }

    #[test]
    fn test_register_without_funds_commits_nothing() {
        let mut state = ProtocolState::new(acct(1), acct(2), ProtocolSettings::default(), 0).unwrap();
        let mut events = Vec::new();
        let err = state
            .register_agent(acct(10), "bot", AgentType::Trading, BASE_UNITS_PER_UNIT, 1, &mut events)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InsufficientFunds { .. }));
        assert!(state.agent(&acct(10)).is_none());
        assert_eq!(state.config.total_fees_collected, 0);
    }

    #[test]
    fn test_deactivate_returns_vault() {
        let owner = acct(10);
        let mut state = funded_state(owner);
        let mut events = Vec::new();
        state
            .register_agent(owner, "bot", AgentType::Service, BASE_UNITS_PER_UNIT, 1, &mut events)
            .unwrap();
        let before = state.book.native_balance(&owner);

        let returned = state.deactivate_agent(owner, 2, &mut events).unwrap();

        assert_eq!(returned, BASE_UNITS_PER_UNIT + ProtocolSettings::default().identity_rent);
        assert_eq!(state.book.native_balance(&owner), before + returned);
        assert!(state.agent(&owner).is_none());
        assert!(matches!(
            state.deactivate_agent(owner, 3, &mut events),
            Err(ProtocolError::AgentNotFound { .. })
        ));
    }

    #[test]
    fn test_slash_amount_scales_and_caps() {
        let owner = acct(10);
        let mut state = funded_state(owner);
        let mut events = Vec::new();
        state
            .register_agent(owner, "bot", AgentType::Service, BASE_UNITS_PER_UNIT, 1, &mut events)
            .unwrap();

        // 5% of stake at a full refund
        assert_eq!(state.agent_slash_amount(&owner, 100).unwrap(), 50_000_000);
        assert_eq!(state.agent_slash_amount(&owner, 35).unwrap(), 17_500_000);
        assert_eq!(state.agent_slash_amount(&owner, 0).unwrap(), 0);
        assert_eq!(state.agent_slash_amount(&acct(99), 100).unwrap(), 0);

        state.apply_agent_slash(&owner, &acct(50), 2 * BASE_UNITS_PER_UNIT, "test", 5, &mut events);
        assert_eq!(state.agent(&owner).unwrap().stake_amount, 0);
    }
}
