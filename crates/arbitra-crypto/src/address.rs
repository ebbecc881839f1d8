//! Deterministic address derivation
//!
//! Records and vaults live at addresses derived from seeds. A derived address
//! is the first `sha256(seeds || bump || domain)` (searching bump from 255
//! down) that is not a valid Ed25519 point, so no private key can sign for it.

use crate::hash::{hash_all, sha256};
use arbitra_types::AccountId;
use ed25519_dalek::VerifyingKey;

/// Domain separator mixed into every derived address
pub const PROGRAM_DOMAIN: &[u8] = b"arbitra-escrow-protocol";

pub const AGREEMENT_SEED: &[u8] = b"escrow";
pub const AGENT_SEED: &[u8] = b"agent";
pub const REPUTATION_SEED: &[u8] = b"reputation";
pub const DISPUTE_POOL_SEED: &[u8] = b"dispute_pool";
pub const CONFIG_SEED: &[u8] = b"protocol_config";
pub const ORACLE_REGISTRY_SEED: &[u8] = b"oracle_registry";
pub const BLACKLIST_SEED: &[u8] = b"blacklist";

/// Hash seeds with a specific bump
pub fn create_address(seeds: &[&[u8]], bump: u8) -> [u8; 32] {
    let bump = [bump];
    let mut items: Vec<&[u8]> = seeds.to_vec();
    items.push(&bump);
    items.push(PROGRAM_DOMAIN);
    hash_all(&items)
}

fn is_on_curve(bytes: &[u8; 32]) -> bool {
    VerifyingKey::from_bytes(bytes).is_ok()
}

/// Find the canonical derived address and its bump
pub fn find_address(seeds: &[&[u8]]) -> (AccountId, u8) {
    for bump in (0..=u8::MAX).rev() {
        let candidate = create_address(seeds, bump);
        if !is_on_curve(&candidate) {
            return (AccountId::new(candidate), bump);
        }
    }
    // Every candidate decompressing is not expected for SHA-256 output.
    (AccountId::new(create_address(seeds, 0)), 0)
}

/// Storage key of the agreement identified by (agent, transaction id)
pub fn agreement_address(agent: &AccountId, transaction_id: &str) -> (AccountId, u8) {
    find_address(&[AGREEMENT_SEED, agent.as_bytes(), transaction_id.as_bytes()])
}

/// Identity record (and stake vault) of an agent owner
pub fn agent_address(owner: &AccountId) -> (AccountId, u8) {
    find_address(&[AGENT_SEED, owner.as_bytes()])
}

/// Reputation record of any participant
pub fn reputation_address(entity: &AccountId) -> (AccountId, u8) {
    find_address(&[REPUTATION_SEED, entity.as_bytes()])
}

/// Vault holding the dispute fees of one agreement
pub fn dispute_pool_address(agreement: &AccountId) -> (AccountId, u8) {
    find_address(&[DISPUTE_POOL_SEED, agreement.as_bytes()])
}

pub fn config_address() -> (AccountId, u8) {
    find_address(&[CONFIG_SEED])
}

/// Oracle registry record; also the vault holding oracle bonds
pub fn oracle_registry_address() -> (AccountId, u8) {
    find_address(&[ORACLE_REGISTRY_SEED])
}

pub fn blacklist_address() -> (AccountId, u8) {
    find_address(&[BLACKLIST_SEED])
}

// ============================================================================
// Selectors and tags
// ============================================================================

fn prefix8(hash: [u8; 32]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash[..8]);
    out
}

/// 8-byte instruction selector: `sha256("global:<name>")[..8]`
pub fn instruction_selector(name: &str) -> [u8; 8] {
    prefix8(sha256(format!("global:{}", name).as_bytes()))
}

/// 8-byte record tag: `sha256("account:<Name>")[..8]`
pub fn record_tag(name: &str) -> [u8; 8] {
    prefix8(sha256(format!("account:{}", name).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agreement_address_is_deterministic() {
        let agent = AccountId::new([9; 32]);
        assert_eq!(agreement_address(&agent, "tx-1"), agreement_address(&agent, "tx-1"));
    }

    #[test]
    fn test_agreement_address_varies_with_inputs() {
        let agent = AccountId::new([9; 32]);
        let other = AccountId::new([8; 32]);
        let (a, _) = agreement_address(&agent, "tx-1");
        let (b, _) = agreement_address(&agent, "tx-2");
        let (c, _) = agreement_address(&other, "tx-1");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_derived_addresses_are_off_curve() {
        for i in 0..16u8 {
            let (addr, bump) = agent_address(&AccountId::new([i; 32]));
            assert!(!is_on_curve(addr.as_bytes()));
            assert_eq!(create_address(&[AGENT_SEED, &[i; 32]], bump), addr.0);
        }
    }

    #[test]
    fn test_selectors_differ() {
        assert_ne!(
            instruction_selector("release_funds"),
            instruction_selector("mark_disputed")
        );
        assert_ne!(record_tag("Escrow"), instruction_selector("Escrow"));
    }
}
