//! End-to-end agreement lifecycles against a shared protocol

mod common;

use arbitra_audit::AuditLog;
use arbitra_core::{ConsensusAttempt, DisputeOutcome, ProtocolError, RoundStatus};
use arbitra_types::{AgreementStatus, ProtocolEvent};
use common::*;

#[tokio::test]
async fn test_release_pays_counterpart_and_builds_reputation() {
    let f = Fixture::standard(0).await;
    let before = f.native(&AGENT).await;

    let key = f.create("order-1", UNIT).await;
    // amount plus the 10 bps agreement fee
    assert_eq!(f.native(&AGENT).await, before - UNIT - 1_000_000);

    assert_eq!(
        f.protocol.release(COUNTERPART, key).await,
        Err(ProtocolError::NotAgentOwner)
    );
    f.protocol.release(AGENT, key).await.unwrap();

    let agreement = f.protocol.agreement(&key).await.unwrap();
    assert_eq!(agreement.status, AgreementStatus::Resolved);
    assert_eq!(agreement.refund_percentage, Some(0));
    assert_eq!(f.native(&COUNTERPART).await, 11 * UNIT);
    assert_eq!(f.native(&key).await, 0);

    let agent = f.protocol.agent(&AGENT).await.unwrap();
    assert_eq!((agent.total_escrows, agent.successful_escrows), (1, 1));
    assert_eq!(agent.reputation, 510);
    let rep = f.protocol.reputation(&COUNTERPART).await.unwrap();
    assert_eq!(rep.total_transactions, 1);
    assert_eq!(rep.reputation_score, 510);

    // Terminal
    assert!(matches!(
        f.protocol.release(AGENT, key).await,
        Err(ProtocolError::InvalidStateTransition { current: AgreementStatus::Resolved, .. })
    ));
    assert!(matches!(
        f.protocol.mark_disputed(COUNTERPART, key).await,
        Err(ProtocolError::InvalidStateTransition { .. })
    ));
    f.assert_conserved().await;
}

#[tokio::test]
async fn test_disputes_follow_the_refund_curve() {
    let f = Fixture::standard(3).await;
    // Base 0.001 plus 50 bps; the base is 10x once every transaction on
    // record was disputed
    let first_pool = 1_000_000 + 5_000_000;
    let repeat_pool = 10 * 1_000_000 + 5_000_000;

    for (i, (score, pct)) in [(30u8, 100u8), (55, 75), (70, 35), (85, 0)].into_iter().enumerate() {
        let pool_fee = if i == 0 { first_pool } else { repeat_pool };
        let txid = format!("order-{}", i);
        let key = f.disputed(&txid, UNIT).await;
        let stake = f.protocol.agent(&AGENT).await.unwrap().stake_amount;
        let agent_before = f.native(&AGENT).await;
        let counterpart_before = f.native(&COUNTERPART).await;

        let first = f.protocol.submit_score(f.submission(0, key, &txid, score)).await.unwrap();
        assert!(matches!(first.attempt, ConsensusAttempt::Waiting { have: 1, need: 3 }));
        f.protocol.submit_score(f.submission(1, key, &txid, score)).await.unwrap();
        let last = f.protocol.submit_score(f.submission(2, key, &txid, score)).await.unwrap();
        let ConsensusAttempt::Resolved(resolution) = last.attempt else {
            panic!("score {} did not resolve: {:?}", score, last.attempt);
        };

        let refund = UNIT * pct as u64 / 100;
        assert_eq!(resolution.quality_score, Some(score));
        assert_eq!(resolution.split.refund_percentage, pct);
        assert_eq!(resolution.split.refund_amount, refund);
        assert_eq!(resolution.split.payment_amount, UNIT - refund);
        assert_eq!(f.native(&AGENT).await, agent_before + refund);
        assert_eq!(f.native(&COUNTERPART).await, counterpart_before + UNIT - refund);

        // 5% of stake at a full refund, scaled by the refund
        assert_eq!(resolution.agent_slashed, stake / 20 * pct as u64 / 100);
        assert_eq!(
            f.protocol.agent(&AGENT).await.unwrap().stake_amount,
            stake - resolution.agent_slashed
        );

        // Half the pool to the panel, the rest to the treasury
        assert_eq!(resolution.oracle_rewards, pool_fee / 2);
        assert_eq!(resolution.treasury_share, pool_fee / 2);
        assert!(resolution.violators.is_empty());

        let agreement = f.protocol.agreement(&key).await.unwrap();
        assert_eq!(agreement.status, AgreementStatus::Resolved);
        assert_eq!(agreement.quality_score, Some(score));
        assert_eq!(f.protocol.round(&key).await.unwrap().status, RoundStatus::Finalized);
    }

    let rep = f.protocol.reputation(&COUNTERPART).await.unwrap();
    assert_eq!(rep.total_transactions, 4);
    assert_eq!(rep.disputes_filed, 4);
    assert_eq!((rep.disputes_won, rep.disputes_partial, rep.disputes_lost), (2, 1, 1));
    assert_eq!(rep.quality_samples, 4);
    assert_eq!(rep.average_quality_received, 60);
    // +0 +2 +6 +10 and one loss
    assert_eq!(rep.reputation_score, 468);
    assert!(rep.counters_consistent());

    // The agent lost the two disputes refunding more than half
    let agent_rep = f.protocol.reputation(&AGENT).await.unwrap();
    assert_eq!(agent_rep.disputes_filed, 0);
    assert_eq!(agent_rep.disputes_lost, 0);
    assert_eq!(agent_rep.reputation_score, 418);
    let agent = f.protocol.agent(&AGENT).await.unwrap();
    assert_eq!(agent.reputation, 418);
    assert_eq!((agent.total_escrows, agent.disputed_escrows), (4, 4));
    assert!(agent.counters_consistent());

    // Each oracle earned a third of every reward pool
    for i in 0..3 {
        let claimed = f.protocol.claim_oracle_rewards(f.oracle(i)).await.unwrap();
        assert_eq!(claimed, (first_pool + 3 * repeat_pool) / 6);
    }
    assert_eq!(
        f.protocol.claim_oracle_rewards(f.oracle(0)).await,
        Err(ProtocolError::NoRewardsToClaim)
    );
    f.assert_conserved().await;
}

#[tokio::test]
async fn test_agent_filed_dispute_mirrors_outcome() {
    let f = Fixture::standard(3).await;
    let key = f.create("order-a", UNIT).await;
    f.protocol.mark_disputed(AGENT, key).await.unwrap();

    for i in 0..3 {
        f.protocol.submit_score(f.submission(i, key, "order-a", 90)).await.unwrap();
    }
    let agreement = f.protocol.agreement(&key).await.unwrap();
    assert_eq!(agreement.refund_percentage, Some(0));
    assert_eq!(agreement.disputed_by, Some(AGENT));

    // No refund: the filing agent won
    let rep = f.protocol.reputation(&AGENT).await.unwrap();
    assert_eq!((rep.disputes_filed, rep.disputes_won), (1, 1));
    let counterpart = f.protocol.reputation(&COUNTERPART).await.unwrap();
    assert_eq!(counterpart.disputes_filed, 0);
    assert_eq!(counterpart.disputes_lost, 0);
    // Full payment, minus the penalty for losing
    assert_eq!(counterpart.reputation_score, 460);
    assert_eq!(
        arbitra_core::dispute_outcome(arbitra_types::EntityType::Agent, 0),
        DisputeOutcome::Won
    );
}

#[tokio::test]
async fn test_claim_expired_returns_funds_once() {
    let f = Fixture::standard(0).await;
    let key = f.create("order-x", UNIT).await;
    let before = f.native(&AGENT).await;

    assert!(matches!(
        f.protocol.claim_expired(COUNTERPART, key).await,
        Err(ProtocolError::NotExpired { .. })
    ));
    f.clock.advance(HOUR as i64);
    assert_eq!(
        f.protocol.claim_expired(TREASURY, key).await,
        Err(ProtocolError::NotAgreementParty)
    );
    assert_eq!(f.protocol.claim_expired(COUNTERPART, key).await.unwrap(), UNIT);
    assert_eq!(f.native(&AGENT).await, before + UNIT);
    assert_eq!(f.protocol.agreement(&key).await.unwrap().status, AgreementStatus::Expired);
    assert!(matches!(
        f.protocol.claim_expired(AGENT, key).await,
        Err(ProtocolError::InvalidStateTransition { current: AgreementStatus::Expired, .. })
    ));

    // Expiry leaves reputation untouched
    assert!(f.protocol.reputation(&COUNTERPART).await.is_none());
    assert_eq!(f.protocol.agent(&AGENT).await.unwrap().total_escrows, 0);
}

#[tokio::test]
async fn test_dispute_window_closes_at_expiry() {
    let f = Fixture::standard(0).await;
    let late = f.create("late", UNIT).await;
    let early = f.create("early", UNIT).await;

    f.clock.advance(HOUR as i64 - 1);
    f.protocol.mark_disputed(COUNTERPART, early).await.unwrap();

    f.clock.advance(1);
    assert!(matches!(
        f.protocol.mark_disputed(COUNTERPART, late).await,
        Err(ProtocolError::DisputeWindowClosed { .. })
    ));
    f.protocol.claim_expired(AGENT, late).await.unwrap();

    // The disputed one stays with the oracles
    assert!(matches!(
        f.protocol.claim_expired(AGENT, early).await,
        Err(ProtocolError::InvalidStateTransition { current: AgreementStatus::Disputed, .. })
    ));
}

#[tokio::test]
async fn test_deactivation_needs_closed_agreements() {
    let f = Fixture::standard(0).await;
    let key = f.create("order-d", UNIT).await;

    assert!(matches!(
        f.protocol.deactivate_agent(AGENT).await,
        Err(ProtocolError::AgentHasOpenAgreements { .. })
    ));
    f.protocol.release(AGENT, key).await.unwrap();
    assert!(f.protocol.open_agreements(&AGENT).await.is_empty());

    // Stake plus rent come back
    let returned = f.protocol.deactivate_agent(AGENT).await.unwrap();
    assert_eq!(returned, UNIT + 2_000_000);
    assert!(f.protocol.agent(&AGENT).await.is_none());
    assert!(matches!(
        f.protocol.create_agreement(arbitra_core::CreateAgreement::native(AGENT, COUNTERPART, UNIT, HOUR, "next")).await,
        Err(ProtocolError::AgentNotFound { .. })
    ));
    f.assert_conserved().await;
}

#[tokio::test]
async fn test_journal_records_committed_events_in_order() {
    let f = Fixture::standard(3).await;
    let mut rx = f.protocol.subscribe();

    let key = f.disputed("order-j", UNIT).await;
    // A failed operation journals nothing
    assert!(f.protocol.release(COUNTERPART, key).await.is_err());
    for i in 0..3 {
        f.protocol.submit_score(f.submission(i, key, "order-j", 72)).await.unwrap();
    }

    let first = rx.recv().await.unwrap();
    assert!(matches!(first.event, ProtocolEvent::AgreementInitialized { .. }));
    let second = rx.recv().await.unwrap();
    assert!(matches!(second.event, ProtocolEvent::DisputeMarked { .. }));
    assert_eq!(second.previous_hash, first.hash);

    let events = f.protocol.journal().events().await;
    assert!(events.iter().any(|e| matches!(e, ProtocolEvent::DisputeResolved { quality_score: Some(72), .. })));
    assert_eq!(
        events.iter().filter(|e| matches!(e, ProtocolEvent::OracleRewarded { .. })).count(),
        3
    );
    assert!(!events.iter().any(|e| matches!(e, ProtocolEvent::FundsReleased { .. })));
    assert!(f.protocol.journal().verify_chain().await.unwrap());
}
