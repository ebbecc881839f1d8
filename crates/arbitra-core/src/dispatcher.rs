//! Instruction dispatch
//!
//! Decodes a signed, encoded instruction and routes it to the protocol.
//! Referenced accounts travel beside the payload:
//!
//! | instruction                         | accounts                          |
//! |-------------------------------------|-----------------------------------|
//! | `initialize_escrow`                 | `[counterpart, mint?]`            |
//! | release / dispute / claim / submit / finalize | `[agreement]`           |
//!
//! The signer is the caller of every routed operation.

use std::sync::Arc;

use arbitra_crypto::Signature;
use arbitra_types::{AccountId, Asset, ProtocolError, Result};
use arbitra_wire::Instruction;
use tracing::debug;

use crate::agreements::CreateAgreement;
use crate::consensus::{OracleSubmission, Resolution, SubmissionReceipt};
use crate::protocol::Protocol;

/// An encoded instruction with its signer and referenced accounts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub signer: AccountId,
    pub accounts: Vec<AccountId>,
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn new(signer: AccountId, instruction: &Instruction) -> Self {
        Self {
            signer,
            accounts: Vec::new(),
            data: instruction.encode(),
        }
    }

    pub fn with_accounts(mut self, accounts: Vec<AccountId>) -> Self {
        self.accounts = accounts;
        self
    }
}

/// What a dispatched instruction did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    AgentCreated,
    AgentDeactivated { returned: u64 },
    AgreementCreated { agreement: AccountId },
    FundsReleased,
    Disputed { deadline: i64 },
    ExpiredClaimed { amount: u64 },
    OracleAdded,
    OracleRemoved { returned: u64 },
    BlacklistUpdated,
    ScoreSubmitted(SubmissionReceipt),
    DisputeFinalized(Resolution),
    Paused,
    Unpaused,
    RewardsClaimed { amount: u64 },
}

fn account_at(accounts: &[AccountId], index: usize, name: &'static str) -> Result<AccountId> {
    accounts
        .get(index)
        .copied()
        .ok_or(ProtocolError::MissingAccount { index, name })
}

/// Routes decoded instructions to a shared protocol
#[derive(Debug, Clone)]
pub struct Dispatcher {
    protocol: Arc<Protocol>,
}

impl Dispatcher {
    pub fn new(protocol: Arc<Protocol>) -> Self {
        Self { protocol }
    }

    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    pub async fn execute(&self, envelope: Envelope) -> Result<DispatchOutcome> {
        let instruction = Instruction::decode(&envelope.data)?;
        let signer = envelope.signer;
        let accounts = envelope.accounts.as_slice();
        debug!(instruction = instruction.name(), signer = %signer.short(), "dispatching");

        let p = &self.protocol;
        let outcome = match instruction {
            Instruction::CreateAgent {
                name,
                agent_type,
                stake_amount,
            } => {
                p.register_agent(signer, &name, agent_type, stake_amount).await?;
                DispatchOutcome::AgentCreated
            }
            Instruction::DeactivateAgent => DispatchOutcome::AgentDeactivated {
                returned: p.deactivate_agent(signer).await?,
            },
            Instruction::InitializeEscrow {
                amount,
                time_lock_seconds,
                transaction_id,
                use_external_asset,
                screening,
            } => {
                let counterpart = account_at(accounts, 0, "counterpart")?;
                let asset = if use_external_asset {
                    Asset::External(account_at(accounts, 1, "mint")?)
                } else {
                    Asset::Native
                };
                let params = CreateAgreement {
                    agent: signer,
                    counterpart,
                    amount,
                    time_lock_seconds,
                    transaction_id,
                    asset,
                    screening,
                };
                DispatchOutcome::AgreementCreated {
                    agreement: p.create_agreement(params).await?,
                }
            }
            Instruction::ReleaseFunds => {
                p.release(signer, account_at(accounts, 0, "agreement")?).await?;
                DispatchOutcome::FundsReleased
            }
            Instruction::MarkDisputed => DispatchOutcome::Disputed {
                deadline: p
                    .mark_disputed(signer, account_at(accounts, 0, "agreement")?)
                    .await?,
            },
            Instruction::ClaimExpiredEscrow => DispatchOutcome::ExpiredClaimed {
                amount: p
                    .claim_expired(signer, account_at(accounts, 0, "agreement")?)
                    .await?,
            },
            Instruction::AddOracle {
                oracle,
                category,
                weight,
            } => {
                p.add_oracle(signer, oracle, category, weight).await?;
                DispatchOutcome::OracleAdded
            }
            Instruction::RemoveOracle { oracle } => DispatchOutcome::OracleRemoved {
                returned: p.remove_oracle(signer, oracle).await?,
            },
            Instruction::AddToBlacklist {
                new_root,
                new_leaf_count,
            } => {
                p.add_blacklist_entries(signer, new_root, new_leaf_count).await?;
                DispatchOutcome::BlacklistUpdated
            }
            Instruction::RemoveFromBlacklist {
                new_root,
                new_leaf_count,
            } => {
                p.remove_blacklist_entries(signer, new_root, new_leaf_count).await?;
                DispatchOutcome::BlacklistUpdated
            }
            Instruction::SubmitOracleScore { score, signature } => {
                let submission = OracleSubmission {
                    agreement: account_at(accounts, 0, "agreement")?,
                    oracle: signer,
                    score,
                    signature: Signature(signature),
                    evidence: None,
                };
                DispatchOutcome::ScoreSubmitted(p.submit_score(submission).await?)
            }
            Instruction::FinalizeDispute => DispatchOutcome::DisputeFinalized(
                p.finalize_dispute(signer, account_at(accounts, 0, "agreement")?)
                    .await?,
            ),
            Instruction::PauseProtocol => {
                p.pause(signer).await?;
                DispatchOutcome::Paused
            }
            Instruction::UnpauseProtocol => {
                p.unpause(signer).await?;
                DispatchOutcome::Unpaused
            }
            Instruction::ClaimOracleRewards => DispatchOutcome::RewardsClaimed {
                amount: p.claim_oracle_rewards(signer).await?,
            },
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::settings::ProtocolSettings;
    use arbitra_types::{AgentType, AgreementStatus, BASE_UNITS_PER_UNIT};

    const UNIT: u64 = BASE_UNITS_PER_UNIT;

    fn acct(b: u8) -> AccountId {
        AccountId::new([b; 32])
    }

    async fn dispatcher() -> Dispatcher {
        let protocol = Protocol::initialize(
            acct(1),
            acct(2),
            ProtocolSettings::default(),
            Arc::new(ManualClock::new(1_000)),
        )
        .unwrap();
        protocol.deposit(acct(10), Asset::Native, 20 * UNIT).await.unwrap();
        Dispatcher::new(Arc::new(protocol))
    }

    fn create_agent() -> Instruction {
        Instruction::CreateAgent {
            name: "agent".into(),
            agent_type: AgentType::Service,
            stake_amount: UNIT,
        }
    }

    fn initialize(txid: &str) -> Instruction {
        Instruction::InitializeEscrow {
            amount: UNIT,
            time_lock_seconds: 3_600,
            transaction_id: txid.into(),
            use_external_asset: false,
            screening: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_create_and_release_through_envelopes() {
        let d = dispatcher().await;
        assert_eq!(
            d.execute(Envelope::new(acct(10), &create_agent())).await.unwrap(),
            DispatchOutcome::AgentCreated
        );

        let created = d
            .execute(Envelope::new(acct(10), &initialize("tx-1")).with_accounts(vec![acct(11)]))
            .await
            .unwrap();
        let DispatchOutcome::AgreementCreated { agreement } = created else {
            panic!("unexpected outcome {:?}", created);
        };
        assert_eq!(agreement, Protocol::agreement_key(&acct(10), "tx-1"));

        d.execute(Envelope::new(acct(10), &Instruction::ReleaseFunds).with_accounts(vec![agreement]))
            .await
            .unwrap();
        let record = d.protocol().agreement(&agreement).await.unwrap();
        assert_eq!(record.status, AgreementStatus::Resolved);
        assert_eq!(d.protocol().balance(&acct(11), &Asset::Native).await, UNIT);
    }

    #[tokio::test]
    async fn test_missing_accounts() {
        let d = dispatcher().await;
        d.execute(Envelope::new(acct(10), &create_agent())).await.unwrap();

        assert_eq!(
            d.execute(Envelope::new(acct(10), &initialize("tx-1"))).await,
            Err(ProtocolError::MissingAccount {
                index: 0,
                name: "counterpart"
            })
        );
        let external = Instruction::InitializeEscrow {
            amount: UNIT,
            time_lock_seconds: 3_600,
            transaction_id: "tx-2".into(),
            use_external_asset: true,
            screening: Vec::new(),
        };
        assert_eq!(
            d.execute(Envelope::new(acct(10), &external).with_accounts(vec![acct(11)]))
                .await,
            Err(ProtocolError::MissingAccount { index: 1, name: "mint" })
        );
        assert_eq!(
            d.execute(Envelope::new(acct(10), &Instruction::MarkDisputed)).await,
            Err(ProtocolError::MissingAccount {
                index: 0,
                name: "agreement"
            })
        );
    }

    #[tokio::test]
    async fn test_garbage_is_rejected() {
        let d = dispatcher().await;
        let envelope = Envelope {
            signer: acct(10),
            accounts: Vec::new(),
            data: vec![0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 0],
        };
        assert!(matches!(
            d.execute(envelope).await,
            Err(ProtocolError::UnknownInstruction { .. })
        ));

        let mut truncated = create_agent().encode();
        truncated.truncate(12);
        let envelope = Envelope {
            signer: acct(10),
            accounts: Vec::new(),
            data: truncated,
        };
        assert!(matches!(
            d.execute(envelope).await,
            Err(ProtocolError::MalformedRecord { .. })
        ));
    }

    #[tokio::test]
    async fn test_admin_instructions_check_signer() {
        let d = dispatcher().await;
        assert!(matches!(
            d.execute(Envelope::new(acct(10), &Instruction::PauseProtocol)).await,
            Err(ProtocolError::Unauthorized { .. })
        ));
        assert_eq!(
            d.execute(Envelope::new(acct(1), &Instruction::PauseProtocol)).await.unwrap(),
            DispatchOutcome::Paused
        );
        assert_eq!(
            d.execute(Envelope::new(acct(10), &create_agent())).await,
            Err(ProtocolError::ProtocolPaused)
        );
    }
}
