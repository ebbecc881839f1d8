//! Deny-list screening
//!
//! The protocol only reads the root. The registry authority replaces it
//! wholesale when entries are added or removed.

use arbitra_crypto::MembershipProof;
use arbitra_types::{AccountId, ProtocolError, ProtocolEvent, Result};
use tracing::info;

use crate::state::{Events, ProtocolState};

impl ProtocolState {
    fn require_blacklist_authority(&self, caller: &AccountId) -> Result<()> {
        if *caller == self.blacklist.authority {
            Ok(())
        } else {
            Err(ProtocolError::unauthorized("caller is not the blacklist authority"))
        }
    }

    /// Publish a root that commits to more entries than before
    pub(crate) fn add_blacklist_entries(
        &mut self,
        caller: AccountId,
        new_root: [u8; 32],
        new_leaf_count: u64,
        now: i64,
        events: &mut Events,
    ) -> Result<()> {
        self.require_blacklist_authority(&caller)?;
        if new_leaf_count < self.blacklist.leaf_count {
            return Err(ProtocolError::invalid_settings(format!(
                "leaf count cannot shrink when adding ({} -> {})",
                self.blacklist.leaf_count, new_leaf_count
            )));
        }
        self.replace_blacklist_root(new_root, new_leaf_count, now, events);
        Ok(())
    }

    /// Publish a root that commits to fewer entries than before
    pub(crate) fn remove_blacklist_entries(
        &mut self,
        caller: AccountId,
        new_root: [u8; 32],
        new_leaf_count: u64,
        now: i64,
        events: &mut Events,
    ) -> Result<()> {
        self.require_blacklist_authority(&caller)?;
        if new_leaf_count > self.blacklist.leaf_count {
            return Err(ProtocolError::invalid_settings(format!(
                "leaf count cannot grow when removing ({} -> {})",
                self.blacklist.leaf_count, new_leaf_count
            )));
        }
        let root = if new_leaf_count == 0 { [0u8; 32] } else { new_root };
        self.replace_blacklist_root(root, new_leaf_count, now, events);
        Ok(())
    }

    fn replace_blacklist_root(&mut self, root: [u8; 32], leaf_count: u64, now: i64, events: &mut Events) {
        self.blacklist.root = root;
        self.blacklist.leaf_count = leaf_count;
        self.blacklist.last_updated = now;

        info!(root = %hex::encode(&root[..8]), leaf_count, "blacklist root updated");
        events.push(ProtocolEvent::BlacklistUpdated {
            root,
            leaf_count,
            timestamp: now,
        });
    }

    /// Whether the proof shows its account is on the deny-list
    pub fn check_membership(&self, proof: &MembershipProof) -> bool {
        !self.blacklist.is_empty() && proof.verify(self.blacklist.root)
    }

    /// Fail if any proof places one of `parties` on the deny-list.
    ///
    /// Proofs for accounts outside `parties` are ignored.
    pub(crate) fn screen(&self, parties: &[AccountId], proofs: &[MembershipProof]) -> Result<()> {
        for proof in proofs {
            if parties.contains(&proof.account) && self.check_membership(proof) {
                return Err(ProtocolError::CounterpartyBlacklisted {
                    account: proof.account.to_hex(),
                });
            }
        }
        Ok(())
    }
}
