//! Reputation ledger
//!
//! One `EntityReputation` per participant, created lazily the first time an
//! agreement counts toward it. Every effect is applied at most once per
//! (agreement, entity): replaying a settlement is a no-op.

use arbitra_crypto::reputation_address;
use arbitra_types::{AccountId, EntityReputation, EntityType, ProtocolEvent};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state::{Events, ProtocolState, ReputationMark};

/// Upper bound of the reputation scale
pub const MAX_REPUTATION: u16 = 1_000;

/// How a settled dispute went for one party
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisputeOutcome {
    Won,
    Partial,
    Lost,
}

/// Label a dispute from one party's side.
///
/// Refund above 50% is a win for the counterpart, no refund is a loss,
/// anything between is partial. The agent gets the mirrored label.
pub fn dispute_outcome(party: EntityType, refund_percentage: u8) -> DisputeOutcome {
    let counterpart_view = if refund_percentage > 50 {
        DisputeOutcome::Won
    } else if refund_percentage == 0 {
        DisputeOutcome::Lost
    } else {
        DisputeOutcome::Partial
    };
    match party {
        EntityType::Counterpart => counterpart_view,
        EntityType::Agent => match counterpart_view {
            DisputeOutcome::Won => DisputeOutcome::Lost,
            DisputeOutcome::Lost => DisputeOutcome::Won,
            DisputeOutcome::Partial => DisputeOutcome::Partial,
        },
    }
}

/// Score after one settled transaction, bounded to 0..=1000
pub fn next_score(current: u16, refund_percentage: u8, lost: bool, gain: u16, penalty: u16) -> u16 {
    let satisfaction = 100 - refund_percentage.min(100) as i64;
    let delta = gain as i64 * satisfaction / 100;
    let penalty = if lost { penalty as i64 } else { 0 };
    (current as i64 + delta - penalty).clamp(0, MAX_REPUTATION as i64) as u16
}

/// Effects of one settled agreement on one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Settlement {
    pub refund_percentage: u8,
    pub quality_score: Option<u8>,
    /// Counted in won/partial/lost; only set for the party that filed
    pub outcome: Option<DisputeOutcome>,
    /// The party lost the dispute, filed or not, and takes the score penalty
    pub lost: bool,
}

impl Settlement {
    /// An undisputed agreement closing at `refund_percentage`
    pub fn undisputed(refund_percentage: u8) -> Self {
        Self {
            refund_percentage,
            quality_score: None,
            outcome: None,
            lost: false,
        }
    }
}

impl ProtocolState {
    /// Returns false if the mark was already present
    fn mark_reputation(&mut self, entity: &AccountId, agreement: &AccountId, mark: ReputationMark) -> bool {
        self.reputation_marks
            .entry(*entity)
            .or_default()
            .insert((*agreement, mark))
    }

    fn reputation_entry(
        &mut self,
        entity: &AccountId,
        entity_type: EntityType,
        now: i64,
    ) -> &mut EntityReputation {
        let base = self.settings.reputation_base;
        self.reputations.entry(*entity).or_insert_with(|| {
            let (_, bump) = reputation_address(entity);
            EntityReputation {
                entity: *entity,
                entity_type,
                total_transactions: 0,
                disputes_filed: 0,
                disputes_won: 0,
                disputes_partial: 0,
                disputes_lost: 0,
                average_quality_received: 0,
                quality_samples: 0,
                reputation_score: base,
                created_at: now,
                last_updated: now,
                bump,
            }
        })
    }

    /// Current score of an entity, or the base score if it has no record yet
    pub(crate) fn reputation_score(&self, entity: &AccountId) -> u16 {
        self.reputations
            .get(entity)
            .map(|r| r.reputation_score)
            .unwrap_or(self.settings.reputation_base)
    }

    pub(crate) fn count_transaction(
        &mut self,
        agreement: &AccountId,
        entity: &AccountId,
        entity_type: EntityType,
        now: i64,
    ) {
        if self.mark_reputation(entity, agreement, ReputationMark::Counted) {
            let rep = self.reputation_entry(entity, entity_type, now);
            rep.total_transactions = rep.total_transactions.saturating_add(1);
            rep.last_updated = now;
        }
    }

    pub(crate) fn record_dispute_filed(
        &mut self,
        agreement: &AccountId,
        filer: &AccountId,
        entity_type: EntityType,
        now: i64,
    ) {
        self.count_transaction(agreement, filer, entity_type, now);
        if self.mark_reputation(filer, agreement, ReputationMark::DisputeFiled) {
            let rep = self.reputation_entry(filer, entity_type, now);
            rep.disputes_filed = rep.disputes_filed.saturating_add(1);
            rep.last_updated = now;
        }
    }

    /// Apply the score, quality and outcome effects of a finished agreement
    pub(crate) fn settle_reputation(
        &mut self,
        agreement: &AccountId,
        entity: &AccountId,
        entity_type: EntityType,
        settlement: Settlement,
        now: i64,
        events: &mut Events,
    ) {
        self.count_transaction(agreement, entity, entity_type, now);
        if !self.mark_reputation(entity, agreement, ReputationMark::Settled) {
            return;
        }
        let gain = self.settings.reputation_tx_gain;
        let penalty = self.settings.reputation_loss_penalty;

        let rep = self.reputation_entry(entity, entity_type, now);
        let old_score = rep.reputation_score;

        if let Some(quality) = settlement.quality_score {
            let samples = rep.quality_samples as u128;
            let total = rep.average_quality_received as u128 * samples + quality as u128;
            let count = samples + 1;
            rep.average_quality_received = ((total + count / 2) / count).min(100) as u8;
            rep.quality_samples = rep.quality_samples.saturating_add(1);
        }
        match settlement.outcome {
            Some(DisputeOutcome::Won) => rep.disputes_won = rep.disputes_won.saturating_add(1),
            Some(DisputeOutcome::Partial) => {
                rep.disputes_partial = rep.disputes_partial.saturating_add(1)
            }
            Some(DisputeOutcome::Lost) => rep.disputes_lost = rep.disputes_lost.saturating_add(1),
            None => {}
        }
        rep.reputation_score =
            next_score(old_score, settlement.refund_percentage, settlement.lost, gain, penalty);
        rep.last_updated = now;
        debug_assert!(rep.counters_consistent());
        let new_score = rep.reputation_score;

        if let Some(agent) = self.agents.get_mut(entity) {
            agent.reputation = new_score as u64;
        }

        info!(
            entity = %entity.short(),
            old_score,
            new_score,
            outcome = ?settlement.outcome,
            lost = settlement.lost,
            "reputation updated"
        );
        events.push(ProtocolEvent::ReputationUpdated {
            entity: *entity,
            old_score,
            new_score,
            timestamp: now,
        });
    }
}
