//! Hashing and Merkle utilities for Arbitra

use arbitra_types::AccountId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of data
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute SHA-256 hash and return as hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Compute hash of multiple items
pub fn hash_all(items: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for item in items {
        hasher.update(item);
    }
    hasher.finalize().into()
}

// ============================================================================
// Merkle trees
// ============================================================================

/// One step of an inclusion proof: `(sibling_is_left, sibling_hash)`
pub type ProofStep = (bool, [u8; 32]);

/// Leaf hash of an account in the deny-list tree
pub fn account_leaf(account: &AccountId) -> [u8; 32] {
    hash_all(&[b"blacklist-leaf", account.as_bytes()])
}

/// Get the Merkle root from leaves. Odd nodes are paired with themselves.
pub fn merkle_root(leaves: &[[u8; 32]]) -> Option<[u8; 32]> {
    if leaves.is_empty() {
        return None;
    }

    let mut layer = leaves.to_vec();
    while layer.len() > 1 {
        layer = next_layer(&layer);
    }
    layer.first().copied()
}

fn next_layer(layer: &[[u8; 32]]) -> Vec<[u8; 32]> {
    layer
        .chunks(2)
        .map(|chunk| {
            let left = chunk[0];
            let right = chunk.get(1).copied().unwrap_or(left);
            hash_all(&[&left, &right])
        })
        .collect()
}

/// Generate Merkle proof for a leaf
pub fn merkle_proof(leaves: &[[u8; 32]], index: usize) -> Vec<ProofStep> {
    if leaves.is_empty() || index >= leaves.len() {
        return vec![];
    }

    let mut proof = Vec::new();
    let mut layer: Vec<[u8; 32]> = leaves.to_vec();
    let mut current_index = index;

    while layer.len() > 1 {
        let sibling_index = current_index ^ 1;
        let sibling = layer.get(sibling_index).copied().unwrap_or(layer[current_index]);
        proof.push((current_index % 2 == 1, sibling));

        layer = next_layer(&layer);
        current_index /= 2;
    }

    proof
}

/// Verify a Merkle proof
pub fn verify_merkle_proof(leaf: [u8; 32], proof: &[ProofStep], root: [u8; 32]) -> bool {
    let mut current = leaf;

    for (is_left, sibling) in proof {
        current = if *is_left {
            hash_all(&[sibling, &current])
        } else {
            hash_all(&[&current, sibling])
        };
    }

    current == root
}

/// Claimed inclusion of an account in the deny-list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipProof {
    pub account: AccountId,
    pub proof: Vec<ProofStep>,
}

impl MembershipProof {
    /// Build the proof for `accounts[index]`
    pub fn build(accounts: &[AccountId], index: usize) -> Option<Self> {
        let account = *accounts.get(index)?;
        let leaves: Vec<[u8; 32]> = accounts.iter().map(account_leaf).collect();
        Some(Self {
            account,
            proof: merkle_proof(&leaves, index),
        })
    }

    /// Check the proof against a root
    pub fn verify(&self, root: [u8; 32]) -> bool {
        verify_merkle_proof(account_leaf(&self.account), &self.proof, root)
    }
}

/// Root committing to a deny-list of accounts (zero root when empty)
pub fn blacklist_root(accounts: &[AccountId]) -> [u8; 32] {
    let leaves: Vec<[u8; 32]> = accounts.iter().map(account_leaf).collect();
    merkle_root(&leaves).unwrap_or([0u8; 32])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts(n: u8) -> Vec<AccountId> {
        (0..n).map(|i| AccountId::new([i + 1; 32])).collect()
    }

    #[test]
    fn test_sha256() {
        assert_eq!(sha256_hex(b"arbitra").len(), 64);
        assert_eq!(hash_all(&[b"arb", b"itra"]), sha256(b"arbitra"));
    }

    #[test]
    fn test_merkle_proof_every_leaf() {
        for n in 1..=7 {
            let leaves: Vec<[u8; 32]> = (0..n).map(|i| sha256(&[i])).collect();
            let root = merkle_root(&leaves).unwrap();
            for (i, leaf) in leaves.iter().enumerate() {
                let proof = merkle_proof(&leaves, i);
                assert!(verify_merkle_proof(*leaf, &proof, root), "n={} i={}", n, i);
            }
        }
    }

    #[test]
    fn test_merkle_proof_invalid() {
        let leaves: Vec<[u8; 32]> = (0..4).map(|i| sha256(&[i])).collect();
        let root = merkle_root(&leaves).unwrap();
        let proof = merkle_proof(&leaves, 0);
        assert!(!verify_merkle_proof(sha256(b"wrong"), &proof, root));
    }

    #[test]
    fn test_membership_proof() {
        let list = accounts(5);
        let root = blacklist_root(&list);
        let proof = MembershipProof::build(&list, 3).unwrap();
        assert!(proof.verify(root));

        let forged = MembershipProof {
            account: AccountId::new([0xee; 32]),
            proof: proof.proof.clone(),
        };
        assert!(!forged.verify(root));
    }

    #[test]
    fn test_empty_blacklist_root_rejects_everything() {
        let root = blacklist_root(&[]);
        assert_eq!(root, [0u8; 32]);
        let proof = MembershipProof {
            account: AccountId::new([1; 32]),
            proof: vec![],
        };
        assert!(!proof.verify(root));
    }
}
