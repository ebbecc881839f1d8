//! Admin-gated configuration: pause switch, admin handover, treasury and fees

use arbitra_ledger::{EntryReason, Transfer};
use arbitra_types::{AccountId, Asset, ProtocolError, ProtocolEvent, Result, BPS_DENOMINATOR};
use tracing::info;

use crate::state::{Events, ProtocolState};

/// New fee schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub agreement_fee_bps: u16,
    pub dispute_fee_bps: u16,
    pub dispute_base_fee: u64,
}

impl ProtocolState {
    pub(crate) fn pause(&mut self, caller: AccountId, now: i64, events: &mut Events) -> Result<()> {
        self.require_admin(&caller)?;
        if !self.config.is_active {
            return Err(ProtocolError::AlreadyPaused);
        }
        self.config.is_active = false;
        self.config.updated_at = now;

        info!(admin = %caller.short(), "protocol paused");
        events.push(ProtocolEvent::ProtocolPaused {
            admin: caller,
            timestamp: now,
        });
        Ok(())
    }

    pub(crate) fn unpause(&mut self, caller: AccountId, now: i64, events: &mut Events) -> Result<()> {
        self.require_admin(&caller)?;
        if self.config.is_active {
            return Err(ProtocolError::NotPaused);
        }
        self.config.is_active = true;
        self.config.updated_at = now;

        info!(admin = %caller.short(), "protocol unpaused");
        events.push(ProtocolEvent::ProtocolUnpaused {
            admin: caller,
            timestamp: now,
        });
        Ok(())
    }

    /// Hand config and registry administration (and the blacklist authority,
    /// when held by the same account) to `new_admin`
    pub(crate) fn transfer_admin(
        &mut self,
        caller: AccountId,
        new_admin: AccountId,
        now: i64,
        events: &mut Events,
    ) -> Result<()> {
        self.require_admin(&caller)?;
        self.config.admin = new_admin;
        self.config.updated_at = now;
        if self.registry.admin == caller {
            self.registry.admin = new_admin;
            self.registry.updated_at = now;
        }
        if self.blacklist.authority == caller {
            self.blacklist.authority = new_admin;
        }

        info!(old_admin = %caller.short(), new_admin = %new_admin.short(), "admin transferred");
        events.push(ProtocolEvent::AdminTransferred {
            old_admin: caller,
            new_admin,
            timestamp: now,
        });
        Ok(())
    }

    pub(crate) fn withdraw_treasury(
        &mut self,
        caller: AccountId,
        asset: Asset,
        amount: u64,
        to: AccountId,
        now: i64,
        events: &mut Events,
    ) -> Result<()> {
        self.require_admin(&caller)?;
        if amount == 0 {
            return Err(ProtocolError::AmountZero);
        }
        self.book.post(
            &[Transfer::new(
                self.config.treasury,
                to,
                asset,
                amount,
                EntryReason::TreasuryWithdrawal,
            )],
            "treasury",
            now,
        )?;

        info!(to = %to.short(), amount, %asset, "treasury withdrawal");
        events.push(ProtocolEvent::TreasuryWithdrawal {
            to,
            amount,
            timestamp: now,
        });
        Ok(())
    }

    pub(crate) fn update_fees(
        &mut self,
        caller: AccountId,
        fees: FeeSchedule,
        now: i64,
        events: &mut Events,
    ) -> Result<()> {
        self.require_admin(&caller)?;
        for bps in [fees.agreement_fee_bps, fees.dispute_fee_bps] {
            if bps as u64 > BPS_DENOMINATOR {
                return Err(ProtocolError::InvalidFeeBps { bps });
            }
        }
        self.config.agreement_fee_bps = fees.agreement_fee_bps;
        self.config.dispute_fee_bps = fees.dispute_fee_bps;
        self.config.dispute_base_fee = fees.dispute_base_fee;
        self.config.updated_at = now;

        info!(
            agreement_fee_bps = fees.agreement_fee_bps,
            dispute_fee_bps = fees.dispute_fee_bps,
            dispute_base_fee = fees.dispute_base_fee,
            "fees updated"
        );
        events.push(ProtocolEvent::FeesUpdated {
            agreement_fee_bps: fees.agreement_fee_bps,
            dispute_fee_bps: fees.dispute_fee_bps,
            dispute_base_fee: fees.dispute_base_fee,
            timestamp: now,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ProtocolSettings;

    fn acct(b: u8) -> AccountId {
        AccountId::new([b; 32])
    }

    fn state() -> ProtocolState {
        ProtocolState::new(acct(1), acct(2), ProtocolSettings::default(), 0).unwrap()
    }

    #[test]
    fn test_pause_toggle() {
        let mut state = state();
        let mut events = Vec::new();

        assert_eq!(state.unpause(acct(1), 1, &mut events), Err(ProtocolError::NotPaused));
        assert!(matches!(state.pause(acct(9), 1, &mut events), Err(ProtocolError::Unauthorized { .. })));
        state.pause(acct(1), 1, &mut events).unwrap();
        assert_eq!(state.ensure_active(), Err(ProtocolError::ProtocolPaused));
        assert_eq!(state.pause(acct(1), 2, &mut events), Err(ProtocolError::AlreadyPaused));
        state.unpause(acct(1), 3, &mut events).unwrap();
        assert!(state.ensure_active().is_ok());
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_transfer_admin_moves_all_roles() {
        let mut state = state();
        let mut events = Vec::new();
        state.transfer_admin(acct(1), acct(5), 1, &mut events).unwrap();

        assert_eq!(state.config().admin, acct(5));
        assert_eq!(state.oracle_registry().admin, acct(5));
        assert_eq!(state.blacklist().authority, acct(5));
        assert!(state.pause(acct(1), 2, &mut events).is_err());
        assert!(state.pause(acct(5), 2, &mut events).is_ok());
    }

    #[test]
    fn test_withdraw_treasury() {
        let mut state = state();
        let mut events = Vec::new();
        state.book.deposit(&acct(2), Asset::Native, 500, "fees", 0).unwrap();

        assert!(matches!(
            state.withdraw_treasury(acct(1), Asset::Native, 501, acct(7), 1, &mut events),
            Err(ProtocolError::InsufficientFunds { requested: 501, available: 500, .. })
        ));
        state
            .withdraw_treasury(acct(1), Asset::Native, 200, acct(7), 1, &mut events)
            .unwrap();
        assert_eq!(state.book.native_balance(&acct(7)), 200);
        assert_eq!(state.book.native_balance(&acct(2)), 300);
    }

    #[test]
    fn test_update_fees() {
        let mut state = state();
        let mut events = Vec::new();
        let fees = FeeSchedule {
            agreement_fee_bps: 25,
            dispute_fee_bps: 10_001,
            dispute_base_fee: 0,
        };
        assert_eq!(
            state.update_fees(acct(1), fees, 1, &mut events),
            Err(ProtocolError::InvalidFeeBps { bps: 10_001 })
        );
        state
            .update_fees(acct(1), FeeSchedule { dispute_fee_bps: 100, ..fees }, 1, &mut events)
            .unwrap();
        assert_eq!(state.config().agreement_fee_bps, 25);
        assert_eq!(state.config().dispute_fee_bps, 100);
    }
}
