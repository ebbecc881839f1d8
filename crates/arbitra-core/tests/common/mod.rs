//! Shared fixtures for the protocol integration tests

#![allow(dead_code)]

use std::sync::Arc;

use arbitra_core::{CreateAgreement, ManualClock, OracleSubmission, Protocol, ProtocolSettings};
use arbitra_crypto::{sign_score, KeyPair};
use arbitra_types::{AccountId, AgentType, Asset, OracleCategory, BASE_UNITS_PER_UNIT};

pub const UNIT: u64 = BASE_UNITS_PER_UNIT;
pub const HOUR: u64 = 3_600;
pub const START: i64 = 1_700_000_000;

pub const ADMIN: AccountId = AccountId::new([1; 32]);
pub const TREASURY: AccountId = AccountId::new([2; 32]);
pub const AGENT: AccountId = AccountId::new([10; 32]);
pub const COUNTERPART: AccountId = AccountId::new([11; 32]);

/// Default settings with scores revealed as soon as the panel is complete
pub fn settings() -> ProtocolSettings {
    ProtocolSettings {
        reveal_delay_secs: 0,
        ..Default::default()
    }
}

pub struct Fixture {
    pub protocol: Arc<Protocol>,
    pub clock: Arc<ManualClock>,
    pub oracles: Vec<KeyPair>,
}

impl Fixture {
    /// Funded agent and counterpart, a registered agent with a one-unit
    /// stake, and `oracles` registered oracles of weight 1
    pub async fn new(settings: ProtocolSettings, oracles: u8) -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let protocol = Protocol::initialize(ADMIN, TREASURY, settings, clock.clone()).unwrap();

        protocol.deposit(AGENT, Asset::Native, 100 * UNIT).await.unwrap();
        protocol.deposit(COUNTERPART, Asset::Native, 10 * UNIT).await.unwrap();
        protocol
            .register_agent(AGENT, "research-agent", AgentType::Service, UNIT)
            .await
            .unwrap();

        let oracles: Vec<KeyPair> = (0..oracles).map(|i| KeyPair::from_bytes(&[100 + i; 32])).collect();
        for oracle in &oracles {
            protocol
                .deposit(oracle.account_id(), Asset::Native, 2 * UNIT)
                .await
                .unwrap();
            protocol
                .add_oracle(ADMIN, oracle.account_id(), OracleCategory::General, 1)
                .await
                .unwrap();
        }

        Self {
            protocol: Arc::new(protocol),
            clock,
            oracles,
        }
    }

    pub async fn standard(oracles: u8) -> Self {
        Self::new(settings(), oracles).await
    }

    pub async fn create(&self, txid: &str, amount: u64) -> AccountId {
        self.protocol
            .create_agreement(CreateAgreement::native(AGENT, COUNTERPART, amount, HOUR, txid))
            .await
            .unwrap()
    }

    /// Create and have the counterpart dispute
    pub async fn disputed(&self, txid: &str, amount: u64) -> AccountId {
        let key = self.create(txid, amount).await;
        self.protocol.mark_disputed(COUNTERPART, key).await.unwrap();
        key
    }

    pub fn oracle(&self, index: usize) -> AccountId {
        self.oracles[index].account_id()
    }

    pub fn submission(&self, index: usize, agreement: AccountId, txid: &str, score: u8) -> OracleSubmission {
        OracleSubmission {
            agreement,
            oracle: self.oracle(index),
            score,
            signature: sign_score(&self.oracles[index], txid, score).unwrap(),
            evidence: None,
        }
    }

    pub async fn native(&self, account: &AccountId) -> u64 {
        self.protocol.balance(account, &Asset::Native).await
    }

    /// Sum of all native balances equals everything ever deposited
    pub async fn assert_conserved(&self) {
        let (recomputed, supply) = self
            .protocol
            .inspect(|s| (s.book().recomputed_supply(&Asset::Native), s.book().supply(&Asset::Native)))
            .await;
        assert_eq!(recomputed, supply as u128);
    }
}
