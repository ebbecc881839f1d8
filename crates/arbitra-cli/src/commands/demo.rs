//! Scripted lifecycle against an in-memory protocol
//!
//! One agent, one counterpart and an oracle per score (never fewer than the
//! panel the amount requires). The first agreement is released; the second
//! is disputed and resolved through the consensus service with the given
//! scores, finalized once the reveal delay has passed.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use arbitra_audit::AuditLog;
use arbitra_core::{
    required_submissions, ConsensusAttempt, ConsensusService, CreateAgreement, ManualClock,
    OracleSubmission, Protocol, ProtocolSettings, Resolution, ServiceConfig,
};
use arbitra_crypto::{sign_score, KeyPair};
use arbitra_types::{
    AccountId, AgentType, AgreementStatus, Asset, OracleCategory, BASE_UNITS_PER_UNIT,
};
use tracing::info;

use crate::display::{self, units};

const ADMIN: AccountId = AccountId::new([1; 32]);
const TREASURY: AccountId = AccountId::new([2; 32]);
const AGENT: AccountId = AccountId::new([10; 32]);
const COUNTERPART: AccountId = AccountId::new([11; 32]);

pub async fn run(settings: ProtocolSettings, scores: Vec<u8>, amount: u64) -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let config = ServiceConfig::from_settings(&settings);
    let panel = required_submissions(amount, settings.min_consensus, settings.max_oracles);
    let reveal_delay = settings.reveal_delay_secs;
    let stake = settings.min_agent_stake.max(BASE_UNITS_PER_UNIT);
    let funding = amount
        .checked_mul(10)
        .and_then(|locked| locked.checked_add(stake.checked_mul(2)?))
        .ok_or_else(|| anyhow!("amount {} is too large to fund the demo", amount))?;
    let protocol = Arc::new(Protocol::initialize(ADMIN, TREASURY, settings, clock.clone())?);
    let mut events = protocol.subscribe();

    display::section("Setup");
    protocol.deposit(AGENT, Asset::Native, funding).await?;
    protocol.deposit(COUNTERPART, Asset::Native, amount).await?;
    protocol
        .register_agent(AGENT, "demo-agent", AgentType::Service, stake)
        .await?;
    display::success(&format!("agent {} staked {}", AGENT.short(), units(stake)));

    let oracles: Vec<KeyPair> = (0..scores.len().max(panel))
        .map(|_| KeyPair::generate())
        .collect();
    for oracle in &oracles {
        let id = oracle.account_id();
        protocol.deposit(id, Asset::Native, 2 * BASE_UNITS_PER_UNIT).await?;
        protocol.add_oracle(ADMIN, id, OracleCategory::General, 1).await?;
    }
    display::success(&format!("{} oracles bonded", oracles.len()));

    display::section("Happy path");
    let released = protocol
        .create_agreement(CreateAgreement::native(AGENT, COUNTERPART, amount, 3_600, "demo-release"))
        .await?;
    protocol.release(AGENT, released).await?;
    display::success(&format!("agreement {} released", released.short()));
    display::kv("Counterpart balance", &units(protocol.balance(&COUNTERPART, &Asset::Native).await));

    display::section("Dispute");
    let txid = "demo-dispute";
    let disputed = protocol
        .create_agreement(CreateAgreement::native(AGENT, COUNTERPART, amount, 3_600, txid))
        .await?;
    let deadline = protocol.mark_disputed(COUNTERPART, disputed).await?;
    display::info(&format!("counterpart disputed; consensus deadline {}", deadline));

    let service = ConsensusService::spawn(protocol.clone(), config);
    let handle = service.handle();
    for (oracle, score) in oracles.iter().zip(scores.iter().copied()) {
        let submission = OracleSubmission {
            agreement: disputed,
            oracle: oracle.account_id(),
            score,
            signature: sign_score(oracle, txid, score)?,
            evidence: None,
        };
        let receipt = handle
            .submit(submission)
            .await
            .with_context(|| format!("submitting score {}", score))?;
        match receipt.attempt {
            ConsensusAttempt::Waiting { have, need } => {
                display::info(&format!("score {} recorded ({}/{})", score, have, need))
            }
            ConsensusAttempt::Sealed { have, reveal_at } => display::info(&format!(
                "score {} recorded ({} in); sealed until {}",
                score, have, reveal_at
            )),
            ConsensusAttempt::Resolved(resolution) => show_resolution(&resolution),
            ConsensusAttempt::Rejected(err) => display::error(&format!("consensus rejected: {}", err)),
        }
    }

    let pending = protocol
        .agreement(&disputed)
        .await
        .is_some_and(|a| a.status == AgreementStatus::Disputed);
    if pending && scores.len() >= panel {
        clock.advance(reveal_delay);
        display::info(&format!("{}s later the scores unseal", reveal_delay));
        match handle.finalize(COUNTERPART, disputed).await {
            Ok(resolution) => show_resolution(&resolution),
            Err(err) => display::error(&format!("finalize failed: {}", err)),
        }
    }
    service.shutdown().await;

    display::section("Standing");
    if let Some(agent) = protocol.agent(&AGENT).await {
        display::kv("Agent reputation", &agent.reputation.to_string());
        display::kv("Agent stake", &units(agent.stake_amount));
        display::kv(
            "Escrows",
            &format!(
                "{} total, {} successful, {} disputed",
                agent.total_escrows, agent.successful_escrows, agent.disputed_escrows
            ),
        );
    }
    let trust = protocol.trust_level(&AGENT).await?;
    display::kv("Trust level", trust.as_str());
    if let Some(rep) = protocol.reputation(&COUNTERPART).await {
        display::kv("Counterpart reputation", &rep.reputation_score.to_string());
    }
    display::kv("Treasury", &units(protocol.balance(&TREASURY, &Asset::Native).await));

    display::section("Journal");
    let mut seen = 0usize;
    while let Ok(entry) = events.try_recv() {
        info!(sequence = entry.sequence, event = ?entry.event, "journal entry");
        seen += 1;
    }
    display::kv("Events", &seen.to_string());
    if protocol.journal().verify_chain().await? {
        display::success("hash chain verified");
    } else {
        display::error("hash chain broken");
    }
    Ok(())
}

fn show_resolution(resolution: &Resolution) {
    display::success(&format!(
        "consensus {:?}: refund {}% ({} back to agent)",
        resolution.quality_score,
        resolution.split.refund_percentage,
        units(resolution.split.refund_amount)
    ));
    display::kv("Agent slashed", &units(resolution.agent_slashed));
    display::kv("Oracle rewards", &units(resolution.oracle_rewards));
    display::kv("Treasury share", &units(resolution.treasury_share));
}
