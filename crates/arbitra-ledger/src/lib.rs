//! Arbitra Ledger - Balance book for escrow custody
//!
//! The book is:
//! - Asset-scoped (native plus any external mint)
//! - Account-keyed by 32-byte account id (wallets, vaults, treasury)
//! - Double-entry (every debit has a matching credit within a posting)
//! - Append-only (entries are never rewritten)
//!
//! # Invariants
//!
//! 1. No negative balances
//! 2. Every entry has a reason
//! 3. A posting applies all of its legs or none of them
//! 4. Transfers conserve value: only deposits and withdrawals change supply
//!
//! The book is synchronous; the protocol owns it inside its state lock so
//! that balance movements commit together with record changes.

use std::collections::HashMap;

use arbitra_types::{AccountId, Asset, ProtocolError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient balance in {account}: have {available}, need {required}")]
    InsufficientBalance {
        account: AccountId,
        available: u64,
        required: u64,
    },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Balance overflow in {account}")]
    Overflow { account: AccountId },
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<LedgerError> for ProtocolError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance {
                account,
                available,
                required,
            } => ProtocolError::InsufficientFunds {
                account: account.to_hex(),
                requested: required,
                available,
            },
            LedgerError::InvalidAmount { .. } => ProtocolError::AmountZero,
            LedgerError::Overflow { .. } => ProtocolError::ArithmeticOverflow,
        }
    }
}

/// Unique identifier for a ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn new() -> Self {
        Self(format!("entry_{}", Uuid::new_v4()))
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

/// Type of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Credit (increase) to an account
    Credit,
    /// Debit (decrease) from an account
    Debit,
}

/// Reason for a ledger movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryReason {
    /// Funds entering from the external runtime
    Deposit,
    /// Funds leaving to the external runtime
    Withdrawal,
    /// Agreement amount moved into custody
    EscrowLock,
    /// Full amount to the counterpart on release
    EscrowRelease,
    /// Refund share back to the agent
    EscrowRefund,
    /// Payment share to the counterpart
    EscrowPayment,
    /// Fee to the treasury
    Fee,
    /// Dispute fee into the agreement's dispute pool
    DisputeFee,
    /// Agent stake or identity rent into the agent vault
    Stake,
    /// Stake and rent returned on deactivation
    StakeReturn,
    /// Slashed stake or bond to the treasury
    Slash,
    /// Oracle bond into the registry vault
    Bond,
    /// Oracle bond returned on removal
    BondReturn,
    /// Oracle reward payout
    Reward,
    /// Treasury withdrawal by the administrator
    TreasuryWithdrawal,
}

/// A single ledger entry (one side of a double-entry)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: EntryId,
    pub account: AccountId,
    pub asset: Asset,
    pub entry_type: EntryType,
    pub amount: u64,
    pub balance_after: u64,
    pub reason: EntryReason,
    pub correlation_id: String,
    pub created_at: i64,
}

/// One leg of a posting: move `amount` of `asset` from `from` to `to`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub from: AccountId,
    pub to: AccountId,
    pub asset: Asset,
    pub amount: u64,
    pub reason: EntryReason,
}

impl Transfer {
    pub fn new(from: AccountId, to: AccountId, asset: Asset, amount: u64, reason: EntryReason) -> Self {
        Self {
            from,
            to,
            asset,
            amount,
            reason,
        }
    }

    /// Native-asset leg
    pub fn native(from: AccountId, to: AccountId, amount: u64, reason: EntryReason) -> Self {
        Self::new(from, to, Asset::Native, amount, reason)
    }
}

/// The balance book
#[derive(Debug, Clone, Default)]
pub struct LedgerBook {
    balances: HashMap<(AccountId, Asset), u64>,
    entries: Vec<LedgerEntry>,
    supply: HashMap<Asset, u64>,
}

impl LedgerBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the balance of an account for a specific asset
    pub fn balance(&self, account: &AccountId, asset: &Asset) -> u64 {
        self.balances.get(&(*account, *asset)).copied().unwrap_or(0)
    }

    /// Native-asset balance
    pub fn native_balance(&self, account: &AccountId) -> u64 {
        self.balance(account, &Asset::Native)
    }

    /// Sum of all balances of an asset
    pub fn supply(&self, asset: &Asset) -> u64 {
        self.supply.get(asset).copied().unwrap_or(0)
    }

    /// Credit funds arriving from outside the book
    pub fn deposit(
        &mut self,
        account: &AccountId,
        asset: Asset,
        amount: u64,
        correlation_id: &str,
        at: i64,
    ) -> Result<u64> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount {
                message: "Amount must be greater than zero".to_string(),
            });
        }
        let new_balance = self
            .balance(account, &asset)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { account: *account })?;
        let new_supply = self
            .supply(&asset)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { account: *account })?;

        self.balances.insert((*account, asset), new_balance);
        self.supply.insert(asset, new_supply);
        self.push_entry(account, asset, EntryType::Credit, amount, new_balance, EntryReason::Deposit, correlation_id, at);
        Ok(new_balance)
    }

    /// Debit funds leaving the book
    pub fn withdraw(
        &mut self,
        account: &AccountId,
        asset: Asset,
        amount: u64,
        correlation_id: &str,
        at: i64,
    ) -> Result<u64> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount {
                message: "Amount must be greater than zero".to_string(),
            });
        }
        let available = self.balance(account, &asset);
        let new_balance = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                account: *account,
                available,
                required: amount,
            })?;

        self.balances.insert((*account, asset), new_balance);
        let supply = self.supply(&asset).saturating_sub(amount);
        self.supply.insert(asset, supply);
        self.push_entry(account, asset, EntryType::Debit, amount, new_balance, EntryReason::Withdrawal, correlation_id, at);
        Ok(new_balance)
    }

    /// Check that a posting would succeed without applying it
    pub fn check(&self, transfers: &[Transfer]) -> Result<()> {
        self.simulate(transfers).map(|_| ())
    }

    /// Apply every leg or none.
    ///
    /// Legs are applied in order, so a later leg may spend what an earlier
    /// leg credited. Zero-amount legs are skipped.
    pub fn post(&mut self, transfers: &[Transfer], correlation_id: &str, at: i64) -> Result<Vec<EntryId>> {
        let projected = self.simulate(transfers)?;

        let mut ids = Vec::new();
        let mut running: HashMap<(AccountId, Asset), u64> = HashMap::new();
        for leg in transfers.iter().filter(|t| t.amount > 0) {
            let from_after = running
                .get(&(leg.from, leg.asset))
                .copied()
                .unwrap_or_else(|| self.balance(&leg.from, &leg.asset))
                - leg.amount;
            running.insert((leg.from, leg.asset), from_after);
            ids.push(self.push_entry(&leg.from, leg.asset, EntryType::Debit, leg.amount, from_after, leg.reason, correlation_id, at));

            let to_after = running
                .get(&(leg.to, leg.asset))
                .copied()
                .unwrap_or_else(|| self.balance(&leg.to, &leg.asset))
                + leg.amount;
            running.insert((leg.to, leg.asset), to_after);
            ids.push(self.push_entry(&leg.to, leg.asset, EntryType::Credit, leg.amount, to_after, leg.reason, correlation_id, at));
        }

        self.balances.extend(projected);
        Ok(ids)
    }

    fn simulate(&self, transfers: &[Transfer]) -> Result<HashMap<(AccountId, Asset), u64>> {
        let mut projected: HashMap<(AccountId, Asset), u64> = HashMap::new();
        for leg in transfers.iter().filter(|t| t.amount > 0) {
            let available = projected
                .get(&(leg.from, leg.asset))
                .copied()
                .unwrap_or_else(|| self.balance(&leg.from, &leg.asset));
            let from_after = available
                .checked_sub(leg.amount)
                .ok_or(LedgerError::InsufficientBalance {
                    account: leg.from,
                    available,
                    required: leg.amount,
                })?;
            projected.insert((leg.from, leg.asset), from_after);

            let to_before = projected
                .get(&(leg.to, leg.asset))
                .copied()
                .unwrap_or_else(|| self.balance(&leg.to, &leg.asset));
            let to_after = to_before
                .checked_add(leg.amount)
                .ok_or(LedgerError::Overflow { account: leg.to })?;
            projected.insert((leg.to, leg.asset), to_after);
        }
        Ok(projected)
    }

    #[allow(clippy::too_many_arguments)]
    fn push_entry(
        &mut self,
        account: &AccountId,
        asset: Asset,
        entry_type: EntryType,
        amount: u64,
        balance_after: u64,
        reason: EntryReason,
        correlation_id: &str,
        at: i64,
    ) -> EntryId {
        let entry = LedgerEntry {
            entry_id: EntryId::new(),
            account: *account,
            asset,
            entry_type,
            amount,
            balance_after,
            reason,
            correlation_id: correlation_id.to_string(),
            created_at: at,
        };
        let id = entry.entry_id.clone();
        self.entries.push(entry);
        id
    }

    /// Get all entries for an account
    pub fn account_entries(&self, account: &AccountId) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| &e.account == account)
            .cloned()
            .collect()
    }

    /// Get entries sharing a correlation id (one agreement, one operation)
    pub fn correlated_entries(&self, correlation_id: &str) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect()
    }

    /// Get the total number of entries
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Get recent entries (newest first)
    pub fn recent_entries(&self, limit: usize) -> Vec<LedgerEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Sum of balances per asset recomputed from scratch
    pub fn recomputed_supply(&self, asset: &Asset) -> u128 {
        self.balances
            .iter()
            .filter(|((_, a), _)| a == asset)
            .map(|(_, v)| *v as u128)
            .sum()
    }
}
