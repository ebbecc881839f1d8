//! Protocol tunables
//!
//! Every field has a default. Settings load from `ARBITRA_*` environment
//! variables or from a serialized document, and are validated before a
//! protocol instance is created.

use crate::refund::{standard_bands, validate_bands, QualityBand};
use arbitra_types::{ProtocolError, Result, BASE_UNITS_PER_UNIT, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Protocol settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    // Fees
    pub agreement_fee_bps: u16,
    pub dispute_fee_bps: u16,
    pub dispute_base_fee: u64,
    pub identity_fee: u64,
    /// Reserved in the agent vault alongside the stake, returned on deactivation
    pub identity_rent: u64,

    // Agents and agreements
    pub min_agent_stake: u64,
    pub max_name_len: usize,
    pub max_transaction_id_len: usize,
    pub min_time_lock_secs: i64,
    pub max_time_lock_secs: i64,
    pub max_agreement_amount: u64,
    /// Share of stake slashed at a 100% refund
    pub agent_slash_bps: u16,

    // Oracles
    pub max_oracles: usize,
    pub min_consensus: u8,
    pub max_score_deviation: u8,
    pub violation_threshold: u8,
    pub violations_before_removal: u8,
    pub oracle_bond: u64,
    pub oracle_slash_bps: u16,
    /// Share of each dispute fee pool paid to in-tolerance oracles
    pub oracle_reward_share_bps: u16,
    pub consensus_timeout_secs: i64,
    /// Scores stay sealed this long after a round's first submission
    pub reveal_delay_secs: i64,

    // Reputation
    pub reputation_base: u16,
    pub reputation_tx_gain: u16,
    pub reputation_loss_penalty: u16,

    pub refund_bands: Vec<QualityBand>,

    // Runtime
    pub event_capacity: usize,
    pub sweep_interval_secs: u64,
    pub request_timeout_ms: u64,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            agreement_fee_bps: 10,
            dispute_fee_bps: 50,
            dispute_base_fee: 1_000_000,
            identity_fee: 1_000_000,
            identity_rent: 2_000_000,

            min_agent_stake: 100_000_000,
            max_name_len: 32,
            max_transaction_id_len: 64,
            min_time_lock_secs: 3_600,
            max_time_lock_secs: 2_592_000,
            max_agreement_amount: 1_000 * BASE_UNITS_PER_UNIT,
            agent_slash_bps: 500,

            max_oracles: 7,
            min_consensus: 3,
            max_score_deviation: 15,
            violation_threshold: 7,
            violations_before_removal: 3,
            oracle_bond: BASE_UNITS_PER_UNIT,
            oracle_slash_bps: 1_000,
            oracle_reward_share_bps: 5_000,
            consensus_timeout_secs: 604_800,
            reveal_delay_secs: 300,

            reputation_base: 500,
            reputation_tx_gain: 10,
            reputation_loss_penalty: 50,

            refund_bands: standard_bands(),

            event_capacity: 1_024,
            sweep_interval_secs: 30,
            request_timeout_ms: 5_000,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ProtocolSettings {
    /// Load from `ARBITRA_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            agreement_fee_bps: env_or("ARBITRA_AGREEMENT_FEE_BPS", d.agreement_fee_bps),
            dispute_fee_bps: env_or("ARBITRA_DISPUTE_FEE_BPS", d.dispute_fee_bps),
            dispute_base_fee: env_or("ARBITRA_DISPUTE_BASE_FEE", d.dispute_base_fee),
            identity_fee: env_or("ARBITRA_IDENTITY_FEE", d.identity_fee),
            identity_rent: env_or("ARBITRA_IDENTITY_RENT", d.identity_rent),
            min_agent_stake: env_or("ARBITRA_MIN_AGENT_STAKE", d.min_agent_stake),
            max_name_len: env_or("ARBITRA_MAX_NAME_LEN", d.max_name_len),
            max_transaction_id_len: env_or("ARBITRA_MAX_TRANSACTION_ID_LEN", d.max_transaction_id_len),
            min_time_lock_secs: env_or("ARBITRA_MIN_TIME_LOCK_SECS", d.min_time_lock_secs),
            max_time_lock_secs: env_or("ARBITRA_MAX_TIME_LOCK_SECS", d.max_time_lock_secs),
            max_agreement_amount: env_or("ARBITRA_MAX_AGREEMENT_AMOUNT", d.max_agreement_amount),
            agent_slash_bps: env_or("ARBITRA_AGENT_SLASH_BPS", d.agent_slash_bps),
            max_oracles: env_or("ARBITRA_MAX_ORACLES", d.max_oracles),
            min_consensus: env_or("ARBITRA_MIN_CONSENSUS", d.min_consensus),
            max_score_deviation: env_or("ARBITRA_MAX_SCORE_DEVIATION", d.max_score_deviation),
            violation_threshold: env_or("ARBITRA_VIOLATION_THRESHOLD", d.violation_threshold),
            violations_before_removal: env_or(
                "ARBITRA_VIOLATIONS_BEFORE_REMOVAL",
                d.violations_before_removal,
            ),
            oracle_bond: env_or("ARBITRA_ORACLE_BOND", d.oracle_bond),
            oracle_slash_bps: env_or("ARBITRA_ORACLE_SLASH_BPS", d.oracle_slash_bps),
            oracle_reward_share_bps: env_or("ARBITRA_ORACLE_REWARD_SHARE_BPS", d.oracle_reward_share_bps),
            consensus_timeout_secs: env_or("ARBITRA_CONSENSUS_TIMEOUT_SECS", d.consensus_timeout_secs),
            reveal_delay_secs: env_or("ARBITRA_REVEAL_DELAY_SECS", d.reveal_delay_secs),
            reputation_base: env_or("ARBITRA_REPUTATION_BASE", d.reputation_base),
            reputation_tx_gain: env_or("ARBITRA_REPUTATION_TX_GAIN", d.reputation_tx_gain),
            reputation_loss_penalty: env_or("ARBITRA_REPUTATION_LOSS_PENALTY", d.reputation_loss_penalty),
            refund_bands: d.refund_bands,
            event_capacity: env_or("ARBITRA_EVENT_CAPACITY", d.event_capacity),
            sweep_interval_secs: env_or("ARBITRA_SWEEP_INTERVAL_SECS", d.sweep_interval_secs),
            request_timeout_ms: env_or("ARBITRA_REQUEST_TIMEOUT_MS", d.request_timeout_ms),
        }
    }

    /// Parse a JSON settings document; absent fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ProtocolError::invalid_settings(e.to_string()))
    }

    /// Reject incoherent settings
    pub fn validate(&self) -> Result<()> {
        for (name, bps) in [
            ("agreement_fee_bps", self.agreement_fee_bps),
            ("dispute_fee_bps", self.dispute_fee_bps),
            ("agent_slash_bps", self.agent_slash_bps),
            ("oracle_slash_bps", self.oracle_slash_bps),
            ("oracle_reward_share_bps", self.oracle_reward_share_bps),
        ] {
            if bps as u64 > BPS_DENOMINATOR {
                return Err(ProtocolError::invalid_settings(format!(
                    "{} is {} (max {})",
                    name, bps, BPS_DENOMINATOR
                )));
            }
        }
        if self.min_consensus == 0 {
            return Err(ProtocolError::invalid_settings("min_consensus must be at least 1"));
        }
        if self.min_consensus as usize > self.max_oracles {
            return Err(ProtocolError::invalid_settings("min_consensus exceeds max_oracles"));
        }
        if self.max_score_deviation > 100 || self.violation_threshold > 100 {
            return Err(ProtocolError::invalid_settings("score deviations must lie in 0..=100"));
        }
        if self.violations_before_removal == 0 {
            return Err(ProtocolError::invalid_settings("violations_before_removal must be at least 1"));
        }
        if self.min_time_lock_secs <= 0 || self.min_time_lock_secs > self.max_time_lock_secs {
            return Err(ProtocolError::invalid_settings("time lock bounds are inverted"));
        }
        if self.consensus_timeout_secs <= 0 {
            return Err(ProtocolError::invalid_settings("consensus_timeout_secs must be positive"));
        }
        if self.reveal_delay_secs < 0 || self.reveal_delay_secs >= self.consensus_timeout_secs {
            return Err(ProtocolError::invalid_settings(
                "reveal_delay_secs must lie in 0..consensus_timeout_secs",
            ));
        }
        if self.max_name_len == 0 || self.max_transaction_id_len == 0 {
            return Err(ProtocolError::invalid_settings("string bounds must be positive"));
        }
        if self.reputation_base > 1_000 {
            return Err(ProtocolError::invalid_settings("reputation_base exceeds 1000"));
        }
        if self.max_agreement_amount == 0 {
            return Err(ProtocolError::invalid_settings("max_agreement_amount must be positive"));
        }
        let mut bands = self.refund_bands.clone();
        bands.sort_by_key(|b| b.min);
        validate_bands(&bands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ProtocolSettings::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings = ProtocolSettings::from_json(r#"{"min_consensus": 2, "max_score_deviation": 20}"#).unwrap();
        assert_eq!(settings.min_consensus, 2);
        assert_eq!(settings.max_score_deviation, 20);
        assert_eq!(settings.agreement_fee_bps, 10);
        assert_eq!(settings.refund_bands.len(), 4);
    }

    #[test]
    fn test_rejects_zero_consensus() {
        let settings = ProtocolSettings {
            min_consensus: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ProtocolError::InvalidSettings { .. })
        ));
    }

    #[test]
    fn test_reveal_delay_must_fit_the_round() {
        let settings = ProtocolSettings {
            reveal_delay_secs: 604_800,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
        let instant = ProtocolSettings {
            reveal_delay_secs: 0,
            ..Default::default()
        };
        assert!(instant.validate().is_ok());
    }

    #[test]
    fn test_rejects_gapped_bands() {
        let settings = ProtocolSettings {
            refund_bands: vec![
                QualityBand::new("low", 0, 49, 100),
                QualityBand::new("high", 51, 100, 0),
            ],
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_excess_bps() {
        let settings = ProtocolSettings {
            agreement_fee_bps: 10_001,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
