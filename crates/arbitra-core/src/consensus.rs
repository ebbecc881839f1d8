//! Oracle consensus and dispute settlement
//!
//! Every disputed agreement owns a `ConsensusRound` that accumulates signed
//! oracle scores until the round's required panel is complete or its
//! deadline passes. Larger agreements need larger panels. Scores stay
//! sealed for the reveal delay after the first submission; once the panel
//! is complete and the delay is over, the next submission or an explicit
//! finalize attempts consensus. A spread beyond `max_score_deviation`
//! rejects the panel instead of averaging it, and the round keeps
//! collecting until an admin reopens it.
//!
//! Settlement posts refund, payment, agent slash, oracle rewards, the
//! treasury share of the dispute pool and any oracle exits in one ledger
//! posting, then updates records.

use arbitra_crypto::{dispute_pool_address, verify_score, Signature};
use arbitra_ledger::{EntryReason, Transfer};
use arbitra_types::{
    AccountId, AgreementStatus, EntityType, ErrorKind, OracleEntry, ProtocolError, ProtocolEvent,
    Result, BASE_UNITS_PER_UNIT,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::refund::{RefundSplit, MAX_QUALITY_SCORE};
use crate::reputation::{dispute_outcome, DisputeOutcome, Settlement};
use crate::state::{bps_of, Events, ProtocolState};

/// Refund applied when an admin splits a stalled dispute
pub const SPLIT_EVENLY_REFUND_PERCENTAGE: u8 = 50;

/// (min agreement amount, panel size), largest first
const PANEL_TIERS: [(u64, usize); 2] = [
    (100 * BASE_UNITS_PER_UNIT, 5),
    (10 * BASE_UNITS_PER_UNIT, 4),
];

/// Submissions needed to settle an agreement of `amount`.
///
/// At least `min_consensus`, more for large agreements, never more than
/// the registry can hold.
pub fn required_submissions(amount: u64, min_consensus: u8, max_oracles: usize) -> usize {
    let floor = (min_consensus as usize).max(1);
    let tier = PANEL_TIERS
        .iter()
        .find(|(min_amount, _)| amount >= *min_amount)
        .map(|(_, panel)| *panel)
        .unwrap_or(floor);
    tier.max(floor).min(max_oracles.max(floor))
}

/// One oracle's score for one agreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub oracle: AccountId,
    pub score: u8,
    /// Registry weight at submission time
    pub weight: u16,
    pub evidence: Option<String>,
    pub submitted_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Collecting,
    /// Deadline passed without a resolution; needs an admin
    Stalled,
    Finalized,
}

/// Per-agreement submission accumulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusRound {
    pub agreement: AccountId,
    pub opened_at: i64,
    pub deadline: i64,
    /// Panel size fixed when the round opens
    pub required: usize,
    pub submissions: Vec<Submission>,
    pub status: RoundStatus,
    pub reopened: u32,
}

impl ConsensusRound {
    pub(crate) fn open(agreement: AccountId, now: i64, timeout_secs: i64, required: usize) -> Self {
        Self {
            agreement,
            opened_at: now,
            deadline: now.saturating_add(timeout_secs),
            required,
            submissions: Vec::new(),
            status: RoundStatus::Collecting,
            reopened: 0,
        }
    }

    pub fn has_submitted(&self, oracle: &AccountId) -> bool {
        self.submissions.iter().any(|s| s.oracle == *oracle)
    }

    pub fn is_past_deadline(&self, now: i64) -> bool {
        now > self.deadline
    }

    /// When the scores unseal, counted from the first submission
    pub fn reveal_at(&self, delay_secs: i64) -> Option<i64> {
        self.submissions
            .first()
            .map(|first| first.submitted_at.saturating_add(delay_secs))
    }
}

/// Weighted consensus over a panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusScore {
    pub score: u8,
    pub spread: u8,
}

/// Weighted average of the panel's scores, rounded to nearest.
///
/// Fails with `ConsensusNotReached` below `required` submissions and
/// with `ScoreDeviationTooHigh` when `max - min` exceeds `max_deviation`.
pub fn compute_consensus(
    submissions: &[Submission],
    required: usize,
    max_deviation: u8,
) -> Result<ConsensusScore> {
    let need = required.max(1);
    let have = submissions.len();
    if have < need {
        return Err(ProtocolError::ConsensusNotReached { have, need });
    }

    let (lo, hi) = submissions
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), s| (lo.min(s.score), hi.max(s.score)));
    let spread = hi.saturating_sub(lo);
    if spread > max_deviation {
        return Err(ProtocolError::ScoreDeviationTooHigh {
            spread,
            max: max_deviation,
        });
    }

    let total_weight: u128 = submissions.iter().map(|s| s.weight as u128).sum();
    if total_weight == 0 {
        return Err(ProtocolError::InvalidOracleWeight);
    }
    let weighted: u128 = submissions
        .iter()
        .map(|s| s.score as u128 * s.weight as u128)
        .sum();
    let score = ((weighted + total_weight / 2) / total_weight).min(MAX_QUALITY_SCORE as u128) as u8;
    Ok(ConsensusScore { score, spread })
}

/// A signed score as submitted by an oracle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleSubmission {
    pub agreement: AccountId,
    pub oracle: AccountId,
    pub score: u8,
    /// Signature over `"<transaction_id>:<score>"`
    pub signature: Signature,
    pub evidence: Option<String>,
}

/// Result of a committed dispute settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub agreement: AccountId,
    /// `None` when an admin split a stalled dispute
    pub quality_score: Option<u8>,
    pub split: RefundSplit,
    pub agent_slashed: u64,
    pub oracle_rewards: u64,
    pub treasury_share: u64,
    pub violators: Vec<AccountId>,
    pub removed_oracles: Vec<AccountId>,
}

/// What happened after a submission was recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusAttempt {
    Waiting { have: usize, need: usize },
    /// The panel is complete but scores are sealed until `reveal_at`
    Sealed { have: usize, reveal_at: i64 },
    Resolved(Resolution),
    /// The panel disagreed; the agreement stays Disputed
    Rejected(ProtocolError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub submissions: usize,
    pub attempt: ConsensusAttempt,
}

/// Admin action on a disputed agreement whose round cannot finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Drop all submissions and start a fresh deadline
    ReopenRound,
    /// Resolve at a 50% refund once the deadline has passed
    SplitEvenly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Reopened { deadline: i64 },
    Resolved(Resolution),
}

/// How a dispute is being settled
struct Verdict {
    quality_score: Option<u8>,
    refund_percentage: u8,
    panel: Vec<Submission>,
    slash_agent: bool,
    reason: &'static str,
}

impl ProtocolState {
    fn round_ref(&self, key: &AccountId) -> Result<&ConsensusRound> {
        self.rounds
            .get(key)
            .ok_or_else(|| ProtocolError::AgreementNotFound { key: key.to_hex() })
    }

    pub(crate) fn open_round(&mut self, key: AccountId, amount: u64, now: i64) -> i64 {
        let required = required_submissions(amount, self.registry.min_consensus, self.settings.max_oracles);
        let round = ConsensusRound::open(key, now, self.settings.consensus_timeout_secs, required);
        let deadline = round.deadline;
        self.rounds.insert(key, round);
        deadline
    }

    /// Record a signed score and attempt consensus if the panel is large enough
    pub(crate) fn submit_score(
        &mut self,
        submission: OracleSubmission,
        now: i64,
        events: &mut Events,
    ) -> Result<SubmissionReceipt> {
        self.ensure_active()?;
        let key = submission.agreement;
        let transaction_id = self
            .agreement_for_transition(&key, AgreementStatus::Disputed, AgreementStatus::Resolved, "submit score for")?
            .transaction_id
            .clone();

        let weight = self
            .registry
            .weight_of(&submission.oracle)
            .ok_or_else(|| ProtocolError::OracleNotRegistered {
                oracle: submission.oracle.to_hex(),
            })?;
        if submission.score > MAX_QUALITY_SCORE {
            return Err(ProtocolError::InvalidQualityScore {
                score: submission.score,
            });
        }
        let signed = verify_score(
            &submission.oracle,
            &transaction_id,
            submission.score,
            &submission.signature,
        );
        if !matches!(signed, Ok(true)) {
            return Err(ProtocolError::InvalidOracleSignature {
                oracle: submission.oracle.to_hex(),
            });
        }

        let round = self.round_ref(&key)?;
        let need = round.required;
        if round.is_past_deadline(now) {
            return Err(ProtocolError::ConsensusNotReached {
                have: round.submissions.len(),
                need,
            });
        }
        if round.has_submitted(&submission.oracle) {
            return Err(ProtocolError::DuplicateSubmission {
                oracle: submission.oracle.to_hex(),
            });
        }

        let mut candidate = round.submissions.clone();
        candidate.push(Submission {
            oracle: submission.oracle,
            score: submission.score,
            weight,
            evidence: submission.evidence,
            submitted_at: now,
        });
        let have = candidate.len();
        let reveal_at = candidate
            .first()
            .map_or(now, |first| first.submitted_at)
            .saturating_add(self.settings.reveal_delay_secs);

        info!(
            agreement = %key.short(),
            oracle = %submission.oracle.short(),
            score = submission.score,
            have,
            need,
            "oracle score submitted"
        );
        events.push(ProtocolEvent::OracleScoreSubmitted {
            agreement: key,
            oracle: submission.oracle,
            score: submission.score,
            submissions: have,
            timestamp: now,
        });

        let attempt = if have < need {
            ConsensusAttempt::Waiting { have, need }
        } else if now < reveal_at {
            info!(agreement = %key.short(), have, reveal_at, "panel complete, scores sealed");
            ConsensusAttempt::Sealed { have, reveal_at }
        } else {
            match self.settle_from_panel(&key, &candidate, need, now, events) {
                Ok(resolution) => ConsensusAttempt::Resolved(resolution),
                Err(err) if err.kind() == ErrorKind::Consensus => {
                    warn!(agreement = %key.short(), error = %err, "consensus rejected");
                    if let ProtocolError::ScoreDeviationTooHigh { spread, max } = &err {
                        events.push(ProtocolEvent::ConsensusRejected {
                            agreement: key,
                            spread: *spread,
                            max_deviation: *max,
                            timestamp: now,
                        });
                    }
                    ConsensusAttempt::Rejected(err)
                }
                Err(err) => return Err(err),
            }
        };

        if let Some(round) = self.rounds.get_mut(&key) {
            round.submissions = candidate;
        }
        Ok(SubmissionReceipt {
            submissions: have,
            attempt,
        })
    }

    /// Explicit consensus attempt over the submissions collected so far
    pub(crate) fn finalize_dispute(
        &mut self,
        caller: AccountId,
        key: AccountId,
        now: i64,
        events: &mut Events,
    ) -> Result<Resolution> {
        self.ensure_active()?;
        let agreement = self.agreement_ref(&key)?;
        let allowed = caller == self.config.admin
            || agreement.is_party(&caller)
            || self.registry.contains(&caller);
        if !allowed {
            return Err(ProtocolError::unauthorized(
                "finalization requires a party, an oracle or the admin",
            ));
        }
        self.agreement_for_transition(&key, AgreementStatus::Disputed, AgreementStatus::Resolved, "finalize")?;

        let round = self.round_ref(&key)?;
        let need = round.required;
        let have = round.submissions.len();
        if have < need {
            return Err(ProtocolError::ConsensusNotReached { have, need });
        }
        if let Some(reveal_at) = round.reveal_at(self.settings.reveal_delay_secs) {
            if now < reveal_at {
                return Err(ProtocolError::RevealDelayNotMet { reveal_at, now });
            }
        }
        let panel = round.submissions.clone();
        self.settle_from_panel(&key, &panel, need, now, events)
    }

    fn settle_from_panel(
        &mut self,
        key: &AccountId,
        panel: &[Submission],
        required: usize,
        now: i64,
        events: &mut Events,
    ) -> Result<Resolution> {
        let consensus = compute_consensus(panel, required, self.registry.max_score_deviation)?;
        let refund_percentage = self.curve.refund_percentage(consensus.score)?;
        self.settle_dispute(
            key,
            Verdict {
                quality_score: Some(consensus.score),
                refund_percentage,
                panel: panel.to_vec(),
                slash_agent: true,
                reason: "quality consensus",
            },
            now,
            events,
        )
    }

    /// Admin path for rounds that cannot finish on their own
    pub(crate) fn recover_stalled_dispute(
        &mut self,
        caller: AccountId,
        key: AccountId,
        action: RecoveryAction,
        now: i64,
        events: &mut Events,
    ) -> Result<RecoveryOutcome> {
        self.require_admin(&caller)?;
        self.agreement_for_transition(&key, AgreementStatus::Disputed, AgreementStatus::Resolved, "recover")?;
        let deadline = self.round_ref(&key)?.deadline;

        match action {
            RecoveryAction::ReopenRound => {
                let timeout = self.settings.consensus_timeout_secs;
                let Some(round) = self.rounds.get_mut(&key) else {
                    return Err(ProtocolError::AgreementNotFound { key: key.to_hex() });
                };
                round.submissions.clear();
                round.deadline = now.saturating_add(timeout);
                round.status = RoundStatus::Collecting;
                round.reopened = round.reopened.saturating_add(1);

                info!(agreement = %key.short(), deadline = round.deadline, "consensus round reopened");
                Ok(RecoveryOutcome::Reopened {
                    deadline: round.deadline,
                })
            }
            RecoveryAction::SplitEvenly => {
                if now <= deadline {
                    return Err(ProtocolError::NotExpired {
                        expires_at: deadline,
                        now,
                    });
                }
                let resolution = self.settle_dispute(
                    &key,
                    Verdict {
                        quality_score: None,
                        refund_percentage: SPLIT_EVENLY_REFUND_PERCENTAGE,
                        panel: Vec::new(),
                        slash_agent: false,
                        reason: "stalled dispute split",
                    },
                    now,
                    events,
                )?;
                Ok(RecoveryOutcome::Resolved(resolution))
            }
        }
    }

    /// Mark rounds whose deadline passed without a resolution
    pub(crate) fn sweep_stalled(&mut self, now: i64, events: &mut Events) -> Vec<AccountId> {
        let mut stalled = Vec::new();
        for (key, round) in self.rounds.iter_mut() {
            if round.status != RoundStatus::Collecting || !round.is_past_deadline(now) {
                continue;
            }
            round.status = RoundStatus::Stalled;
            let have = round.submissions.len();
            let need = round.required;
            warn!(agreement = %key.short(), have, need, "consensus round stalled");
            events.push(ProtocolEvent::ConsensusStalled {
                agreement: *key,
                have,
                need,
                timestamp: now,
            });
            stalled.push(*key);
        }
        stalled.sort();
        stalled
    }

    fn settle_dispute(
        &mut self,
        key: &AccountId,
        verdict: Verdict,
        now: i64,
        events: &mut Events,
    ) -> Result<Resolution> {
        let agreement = self
            .agreement_for_transition(key, AgreementStatus::Disputed, AgreementStatus::Resolved, "resolve")?
            .clone();
        let split = RefundSplit::from_percentage(agreement.amount, verdict.refund_percentage);
        let treasury = self.config.treasury;

        let mut legs = vec![
            Transfer::new(*key, agreement.agent, agreement.asset, split.refund_amount, EntryReason::EscrowRefund),
            Transfer::new(*key, agreement.counterpart, agreement.asset, split.payment_amount, EntryReason::EscrowPayment),
        ];

        let agent_slashed = if verdict.slash_agent && split.refund_percentage > 0 {
            self.agent_slash_amount(&agreement.agent, split.refund_percentage)?
        } else {
            0
        };
        legs.push(self.agent_slash_leg(&agreement.agent, agent_slashed));

        // Judge the panel against the consensus score
        let mut in_tolerance: Vec<(AccountId, u16)> = Vec::new();
        let mut violators: Vec<AccountId> = Vec::new();
        if let Some(score) = verdict.quality_score {
            for s in &verdict.panel {
                if !self.registry.contains(&s.oracle) {
                    continue;
                }
                if s.score.abs_diff(score) > self.registry.violation_threshold {
                    violators.push(s.oracle);
                } else {
                    in_tolerance.push((s.oracle, s.weight));
                }
            }
        }

        // Split the dispute pool between rewards and the treasury
        let (pool, _) = dispute_pool_address(key);
        let pool_balance = self.book.native_balance(&pool);
        let reward_pool = if in_tolerance.is_empty() {
            0
        } else {
            bps_of(pool_balance, self.settings.oracle_reward_share_bps)?
        };
        let total_weight: u128 = in_tolerance.iter().map(|(_, w)| *w as u128).sum();
        let rewards: Vec<(AccountId, u64)> = in_tolerance
            .iter()
            .map(|(oracle, w)| {
                let share = reward_pool as u128 * *w as u128 / total_weight.max(1);
                (*oracle, share as u64)
            })
            .collect();
        let oracle_rewards: u64 = rewards.iter().map(|(_, r)| *r).sum();
        let treasury_share = pool_balance - oracle_rewards;
        legs.push(Transfer::native(pool, self.vaults.oracle_rewards, oracle_rewards, EntryReason::Reward));
        legs.push(Transfer::native(pool, treasury, treasury_share, EntryReason::Fee));
        let total_fees = self.fees_after(treasury_share)?;

        // Oracles reaching the violation limit leave with a slashed bond
        let mut exits: Vec<(OracleEntry, u64)> = Vec::new();
        for oracle in &violators {
            let Some(entry) = self.registry.find(oracle) else {
                continue;
            };
            if entry.violation_count.saturating_add(1) >= self.settings.violations_before_removal {
                let slash = bps_of(entry.bond, self.settings.oracle_slash_bps)?.min(entry.bond);
                legs.extend(self.oracle_exit_legs(entry, slash));
                exits.push((entry.clone(), slash));
            }
        }

        self.book
            .post(&legs, &format!("agreement:{}", key.short()), now)?;

        // Commit records
        self.config.total_fees_collected = total_fees;
        if let Some(record) = self.agreements.get_mut(key) {
            record.status = AgreementStatus::Resolved;
            record.quality_score = verdict.quality_score;
            record.refund_percentage = Some(split.refund_percentage);
            record.resolved_at = Some(now);
        }
        if let Some(round) = self.rounds.get_mut(key) {
            round.status = RoundStatus::Finalized;
        }
        if let Some(agent) = self.agents.get_mut(&agreement.agent) {
            agent.last_active = now;
        }

        info!(
            agreement = %key.short(),
            quality_score = ?verdict.quality_score,
            refund_percentage = split.refund_percentage,
            refund = split.refund_amount,
            payment = split.payment_amount,
            reason = verdict.reason,
            "dispute resolved"
        );
        events.push(ProtocolEvent::DisputeResolved {
            agreement: *key,
            quality_score: verdict.quality_score,
            refund_percentage: split.refund_percentage,
            refund_amount: split.refund_amount,
            payment_amount: split.payment_amount,
            timestamp: now,
        });

        self.apply_agent_slash(&agreement.agent, key, agent_slashed, verdict.reason, now, events);

        for (oracle, amount) in &rewards {
            if let Some(entry) = self.registry.find_mut(oracle) {
                entry.pending_rewards = entry.pending_rewards.saturating_add(*amount);
                entry.total_rewards = entry.total_rewards.saturating_add(*amount);
            }
            if *amount > 0 {
                events.push(ProtocolEvent::OracleRewarded {
                    oracle: *oracle,
                    agreement: *key,
                    amount: *amount,
                    timestamp: now,
                });
            }
        }
        for oracle in &violators {
            if let Some(entry) = self.registry.find_mut(oracle) {
                entry.violation_count = entry.violation_count.saturating_add(1);
                warn!(oracle = %oracle.short(), violations = entry.violation_count, "oracle outside tolerance");
            }
        }
        let mut removed_oracles = Vec::new();
        for (entry, slash) in exits {
            let violations = entry.violation_count.saturating_add(1);
            self.registry.oracles.retain(|o| o.oracle != entry.oracle);
            warn!(oracle = %entry.oracle.short(), slash, violations, "oracle removed after violations");
            events.push(ProtocolEvent::OracleSlashed {
                oracle: entry.oracle,
                amount: slash,
                violations,
                timestamp: now,
            });
            events.push(ProtocolEvent::OracleRemoved {
                oracle: entry.oracle,
                returned_bond: entry.bond - slash,
                reason: "violation limit reached".to_string(),
                timestamp: now,
            });
            removed_oracles.push(entry.oracle);
        }
        if !removed_oracles.is_empty() || !violators.is_empty() {
            self.registry.updated_at = now;
        }

        // Both parties take the score effects; outcome counters go on the
        // filer only so they stay within disputes filed
        let filer = agreement.disputed_by;
        for (party, entity_type) in [
            (agreement.agent, EntityType::Agent),
            (agreement.counterpart, EntityType::Counterpart),
        ] {
            let outcome = dispute_outcome(entity_type, split.refund_percentage);
            self.settle_reputation(
                key,
                &party,
                entity_type,
                Settlement {
                    refund_percentage: split.refund_percentage,
                    quality_score: verdict.quality_score,
                    outcome: (filer == Some(party)).then_some(outcome),
                    lost: outcome == DisputeOutcome::Lost,
                },
                now,
                events,
            );
        }

        Ok(Resolution {
            agreement: *key,
            quality_score: verdict.quality_score,
            split,
            agent_slashed,
            oracle_rewards,
            treasury_share,
            violators,
            removed_oracles,
        })
    }
}
