//! Instruction encoding
//!
//! `[8-byte selector][payload]`, selector = `sha256("global:<name>")[..8]`.

use crate::codec::{Reader, Writer};
use crate::{Result, WireError};
use arbitra_crypto::{instruction_selector, MembershipProof, ProofStep};
use arbitra_types::{AccountId, AgentType, OracleCategory};

/// A decoded protocol instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    CreateAgent {
        name: String,
        agent_type: AgentType,
        stake_amount: u64,
    },
    DeactivateAgent,
    InitializeEscrow {
        amount: u64,
        time_lock_seconds: u64,
        transaction_id: String,
        use_external_asset: bool,
        /// Optional trailing deny-list proofs for the parties
        screening: Vec<MembershipProof>,
    },
    ReleaseFunds,
    MarkDisputed,
    ClaimExpiredEscrow,
    AddOracle {
        oracle: AccountId,
        category: OracleCategory,
        weight: u16,
    },
    RemoveOracle {
        oracle: AccountId,
    },
    AddToBlacklist {
        new_root: [u8; 32],
        new_leaf_count: u64,
    },
    RemoveFromBlacklist {
        new_root: [u8; 32],
        new_leaf_count: u64,
    },
    SubmitOracleScore {
        score: u8,
        signature: [u8; 64],
    },
    FinalizeDispute,
    PauseProtocol,
    UnpauseProtocol,
    ClaimOracleRewards,
}

/// Every instruction name, in selector order of declaration
pub const INSTRUCTION_NAMES: [&str; 15] = [
    "create_agent",
    "deactivate_agent",
    "initialize_escrow",
    "release_funds",
    "mark_disputed",
    "claim_expired_escrow",
    "add_oracle",
    "remove_oracle",
    "add_to_blacklist",
    "remove_from_blacklist",
    "submit_oracle_score",
    "finalize_dispute",
    "pause_protocol",
    "unpause_protocol",
    "claim_oracle_rewards",
];

impl Instruction {
    /// Snake-case instruction name
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateAgent { .. } => "create_agent",
            Self::DeactivateAgent => "deactivate_agent",
            Self::InitializeEscrow { .. } => "initialize_escrow",
            Self::ReleaseFunds => "release_funds",
            Self::MarkDisputed => "mark_disputed",
            Self::ClaimExpiredEscrow => "claim_expired_escrow",
            Self::AddOracle { .. } => "add_oracle",
            Self::RemoveOracle { .. } => "remove_oracle",
            Self::AddToBlacklist { .. } => "add_to_blacklist",
            Self::RemoveFromBlacklist { .. } => "remove_from_blacklist",
            Self::SubmitOracleScore { .. } => "submit_oracle_score",
            Self::FinalizeDispute => "finalize_dispute",
            Self::PauseProtocol => "pause_protocol",
            Self::UnpauseProtocol => "unpause_protocol",
            Self::ClaimOracleRewards => "claim_oracle_rewards",
        }
    }

    pub fn selector(&self) -> [u8; 8] {
        instruction_selector(self.name())
    }

    /// Encode selector and payload
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.raw(&self.selector());
        match self {
            Self::CreateAgent {
                name,
                agent_type,
                stake_amount,
            } => {
                w.string(name).u8(agent_type.as_u8()).u64(*stake_amount);
            }
            Self::InitializeEscrow {
                amount,
                time_lock_seconds,
                transaction_id,
                use_external_asset,
                screening,
            } => {
                w.u64(*amount)
                    .u64(*time_lock_seconds)
                    .string(transaction_id)
                    .bool(*use_external_asset);
                if !screening.is_empty() {
                    write_proofs(&mut w, screening);
                }
            }
            Self::AddOracle {
                oracle,
                category,
                weight,
            } => {
                w.account(oracle).u8(category.as_u8()).u16(*weight);
            }
            Self::RemoveOracle { oracle } => {
                w.account(oracle);
            }
            Self::AddToBlacklist {
                new_root,
                new_leaf_count,
            }
            | Self::RemoveFromBlacklist {
                new_root,
                new_leaf_count,
            } => {
                w.raw(new_root).u64(*new_leaf_count);
            }
            Self::SubmitOracleScore { score, signature } => {
                w.u8(*score).raw(signature);
            }
            Self::DeactivateAgent
            | Self::ReleaseFunds
            | Self::MarkDisputed
            | Self::ClaimExpiredEscrow
            | Self::FinalizeDispute
            | Self::PauseProtocol
            | Self::UnpauseProtocol
            | Self::ClaimOracleRewards => {}
        }
        w.into_bytes()
    }

    /// Decode an instruction; the payload must be consumed exactly
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let selector = r.tag()?;
        let name = INSTRUCTION_NAMES
            .iter()
            .find(|n| instruction_selector(n) == selector)
            .ok_or_else(|| WireError::UnknownSelector(hex::encode(selector)))?;

        let ix = match *name {
            "create_agent" => {
                let name = r.string("name")?;
                let raw_type = r.u8()?;
                let agent_type = AgentType::from_u8(raw_type).ok_or(WireError::InvalidDiscriminant {
                    field: "agent_type",
                    value: raw_type,
                })?;
                Self::CreateAgent {
                    name,
                    agent_type,
                    stake_amount: r.u64()?,
                }
            }
            "deactivate_agent" => Self::DeactivateAgent,
            "initialize_escrow" => {
                let amount = r.u64()?;
                let time_lock_seconds = r.u64()?;
                let transaction_id = r.string("transaction_id")?;
                let use_external_asset = r.bool("use_external_asset")?;
                let screening = if r.is_empty() {
                    Vec::new()
                } else {
                    read_proofs(&mut r)?
                };
                Self::InitializeEscrow {
                    amount,
                    time_lock_seconds,
                    transaction_id,
                    use_external_asset,
                    screening,
                }
            }
            "release_funds" => Self::ReleaseFunds,
            "mark_disputed" => Self::MarkDisputed,
            "claim_expired_escrow" => Self::ClaimExpiredEscrow,
            "add_oracle" => {
                let oracle = r.account()?;
                let raw_category = r.u8()?;
                let category =
                    OracleCategory::from_u8(raw_category).ok_or(WireError::InvalidDiscriminant {
                        field: "category",
                        value: raw_category,
                    })?;
                Self::AddOracle {
                    oracle,
                    category,
                    weight: r.u16()?,
                }
            }
            "remove_oracle" => Self::RemoveOracle {
                oracle: r.account()?,
            },
            "add_to_blacklist" => Self::AddToBlacklist {
                new_root: r.bytes32()?,
                new_leaf_count: r.u64()?,
            },
            "remove_from_blacklist" => Self::RemoveFromBlacklist {
                new_root: r.bytes32()?,
                new_leaf_count: r.u64()?,
            },
            "submit_oracle_score" => Self::SubmitOracleScore {
                score: r.u8()?,
                signature: r.bytes64()?,
            },
            "finalize_dispute" => Self::FinalizeDispute,
            "pause_protocol" => Self::PauseProtocol,
            "unpause_protocol" => Self::UnpauseProtocol,
            "claim_oracle_rewards" => Self::ClaimOracleRewards,
            other => return Err(WireError::UnknownSelector(other.to_string())),
        };
        r.finish()?;
        Ok(ix)
    }
}

// [u32 count] then per proof: [32 account][u32 steps] then per step: [u8 is_left][32 hash]
fn write_proofs(w: &mut Writer, proofs: &[MembershipProof]) {
    w.u32(proofs.len() as u32);
    for proof in proofs {
        w.account(&proof.account).u32(proof.proof.len() as u32);
        for (is_left, sibling) in &proof.proof {
            w.bool(*is_left).raw(sibling);
        }
    }
}

fn read_proofs(r: &mut Reader<'_>) -> Result<Vec<MembershipProof>> {
    const STEP_LEN: usize = 33;
    let count = r.u32()? as usize;
    // each proof is at least 36 bytes
    if count.saturating_mul(36) > r.remaining() {
        return Err(WireError::UnexpectedEnd {
            needed: count.saturating_mul(36),
            remaining: r.remaining(),
        });
    }
    let mut proofs = Vec::with_capacity(count);
    for _ in 0..count {
        let account = r.account()?;
        let steps = r.u32()? as usize;
        if steps.saturating_mul(STEP_LEN) > r.remaining() {
            return Err(WireError::UnexpectedEnd {
                needed: steps.saturating_mul(STEP_LEN),
                remaining: r.remaining(),
            });
        }
        let mut proof: Vec<ProofStep> = Vec::with_capacity(steps);
        for _ in 0..steps {
            let is_left = r.bool("proof_side")?;
            proof.push((is_left, r.bytes32()?));
        }
        proofs.push(MembershipProof { account, proof });
    }
    Ok(proofs)
}
