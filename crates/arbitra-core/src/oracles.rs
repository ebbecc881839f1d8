//! Oracle registry administration, bonds and rewards
//!
//! Bonds are held by the registry vault, accrued rewards by the rewards
//! vault. Both are paid out to the oracle's own account.

use arbitra_ledger::{EntryReason, Transfer};
use arbitra_types::{AccountId, OracleCategory, OracleEntry, ProtocolError, ProtocolEvent, Result};
use tracing::info;

use crate::state::{Events, ProtocolState};

impl ProtocolState {
    fn require_registry_admin(&self, caller: &AccountId) -> Result<()> {
        if *caller == self.registry.admin {
            Ok(())
        } else {
            Err(ProtocolError::unauthorized("caller is not the oracle registry admin"))
        }
    }

    fn oracle_entry(&self, oracle: &AccountId) -> Result<&OracleEntry> {
        self.registry
            .find(oracle)
            .ok_or_else(|| ProtocolError::OracleNotRegistered {
                oracle: oracle.to_hex(),
            })
    }

    /// Register an oracle and take its bond
    pub(crate) fn add_oracle(
        &mut self,
        caller: AccountId,
        oracle: AccountId,
        category: OracleCategory,
        weight: u16,
        now: i64,
        events: &mut Events,
    ) -> Result<()> {
        self.require_registry_admin(&caller)?;
        if weight == 0 {
            return Err(ProtocolError::InvalidOracleWeight);
        }
        if self.registry.contains(&oracle) {
            return Err(ProtocolError::OracleAlreadyRegistered {
                oracle: oracle.to_hex(),
            });
        }
        if self.registry.oracles.len() >= self.settings.max_oracles {
            return Err(ProtocolError::OracleRegistryFull {
                max: self.settings.max_oracles,
            });
        }

        let bond = self.settings.oracle_bond;
        self.book.post(
            &[Transfer::native(oracle, self.vaults.oracle_registry, bond, EntryReason::Bond)],
            &format!("oracle:{}", oracle.short()),
            now,
        )?;
        self.registry.oracles.push(OracleEntry {
            oracle,
            category,
            weight,
            bond,
            violation_count: 0,
            pending_rewards: 0,
            total_rewards: 0,
        });
        self.registry.updated_at = now;

        info!(oracle = %oracle.short(), ?category, weight, bond, "oracle added");
        events.push(ProtocolEvent::OracleAdded {
            oracle,
            category,
            weight,
            bond,
            timestamp: now,
        });
        Ok(())
    }

    /// Admin removal; returns bond plus unclaimed rewards
    pub(crate) fn remove_oracle(
        &mut self,
        caller: AccountId,
        oracle: AccountId,
        now: i64,
        events: &mut Events,
    ) -> Result<u64> {
        self.require_registry_admin(&caller)?;
        let entry = self.oracle_entry(&oracle)?.clone();

        let legs = self.oracle_exit_legs(&entry, 0);
        self.book
            .post(&legs, &format!("oracle:{}", oracle.short()), now)?;
        self.registry.oracles.retain(|o| o.oracle != oracle);
        self.registry.updated_at = now;

        let returned = entry.bond.saturating_add(entry.pending_rewards);
        info!(oracle = %oracle.short(), returned, "oracle removed");
        events.push(ProtocolEvent::OracleRemoved {
            oracle,
            returned_bond: entry.bond,
            reason: "removed by admin".to_string(),
            timestamp: now,
        });
        Ok(returned)
    }

    /// Legs paying an exiting oracle: bond minus `slash` back to it, the
    /// slash to the treasury, and any pending rewards.
    pub(crate) fn oracle_exit_legs(&self, entry: &OracleEntry, slash: u64) -> Vec<Transfer> {
        let slash = slash.min(entry.bond);
        vec![
            Transfer::native(
                self.vaults.oracle_registry,
                self.config.treasury,
                slash,
                EntryReason::Slash,
            ),
            Transfer::native(
                self.vaults.oracle_registry,
                entry.oracle,
                entry.bond - slash,
                EntryReason::BondReturn,
            ),
            Transfer::native(
                self.vaults.oracle_rewards,
                entry.oracle,
                entry.pending_rewards,
                EntryReason::Reward,
            ),
        ]
    }

    /// Pay out accrued rewards
    pub(crate) fn claim_oracle_rewards(
        &mut self,
        oracle: AccountId,
        now: i64,
        events: &mut Events,
    ) -> Result<u64> {
        let amount = self.oracle_entry(&oracle)?.pending_rewards;
        if amount == 0 {
            return Err(ProtocolError::NoRewardsToClaim);
        }
        self.book.post(
            &[Transfer::native(self.vaults.oracle_rewards, oracle, amount, EntryReason::Reward)],
            &format!("oracle:{}", oracle.short()),
            now,
        )?;
        if let Some(entry) = self.registry.find_mut(&oracle) {
            entry.pending_rewards = 0;
        }

        info!(oracle = %oracle.short(), amount, "oracle rewards claimed");
        events.push(ProtocolEvent::OracleRewardsClaimed {
            oracle,
            amount,
            timestamp: now,
        });
        Ok(amount)
    }
}
