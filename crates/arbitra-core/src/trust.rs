//! Trust levels derived from reputation and stake, and the dispute cost
//! multiplier derived from a filer's dispute history

use arbitra_types::BASE_UNITS_PER_UNIT;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse trust classification of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Low,
    Medium,
    High,
    Trusted,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Low => "low",
            TrustLevel::Medium => "medium",
            TrustLevel::High => "high",
            TrustLevel::Trusted => "trusted",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// (level, min reputation, min stake in base units), strongest first
const THRESHOLDS: [(TrustLevel, u64, u64); 3] = [
    (TrustLevel::Trusted, 850, 10 * BASE_UNITS_PER_UNIT),
    (TrustLevel::High, 650, BASE_UNITS_PER_UNIT),
    (TrustLevel::Medium, 450, BASE_UNITS_PER_UNIT / 2),
];

/// Map (reputation, stake) to a trust level. Monotone in both arguments.
pub fn trust_level(reputation: u64, stake: u64) -> TrustLevel {
    THRESHOLDS
        .iter()
        .find(|(_, min_rep, min_stake)| reputation >= *min_rep && stake >= *min_stake)
        .map(|(level, _, _)| *level)
        .unwrap_or(TrustLevel::Low)
}

/// (max dispute rate in percent, multiplier), lowest first
const DISPUTE_COST_TIERS: [(u64, u64); 3] = [(20, 1), (40, 2), (60, 5)];
const MAX_DISPUTE_COST_MULTIPLIER: u64 = 10;

/// Multiplier on the base dispute fee for a filer who has filed `filed`
/// disputes over `total` transactions. No history costs the base fee.
pub fn dispute_cost_multiplier(filed: u64, total: u64) -> u64 {
    if total == 0 {
        return 1;
    }
    let rate = filed.saturating_mul(100) / total;
    DISPUTE_COST_TIERS
        .iter()
        .find(|(max_rate, _)| rate <= *max_rate)
        .map(|(_, multiplier)| *multiplier)
        .unwrap_or(MAX_DISPUTE_COST_MULTIPLIER)
}
