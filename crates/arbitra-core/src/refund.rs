//! Quality-to-refund curve
//!
//! A banded, exhaustive mapping from a 0..=100 quality score to the share
//! of the locked amount returned to the agent. The remainder of the integer
//! division always goes to the payment, so refund + payment == amount.

use arbitra_types::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// Highest valid quality score
pub const MAX_QUALITY_SCORE: u8 = 100;

/// One contiguous score range and its refund percentage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityBand {
    pub name: String,
    pub min: u8,
    pub max: u8,
    pub refund_percentage: u8,
}

impl QualityBand {
    pub fn new(name: &str, min: u8, max: u8, refund_percentage: u8) -> Self {
        Self {
            name: name.to_string(),
            min,
            max,
            refund_percentage,
        }
    }

    pub fn contains(&self, score: u8) -> bool {
        (self.min..=self.max).contains(&score)
    }
}

/// Refund and payment amounts for one agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundSplit {
    pub refund_percentage: u8,
    pub refund_amount: u64,
    pub payment_amount: u64,
}

impl RefundSplit {
    /// Split `amount` by a refund percentage (0..=100)
    pub fn from_percentage(amount: u64, refund_percentage: u8) -> Self {
        let pct = refund_percentage.min(100) as u128;
        // amount * pct / 100 <= amount, so the narrowing cannot truncate
        let refund_amount = (amount as u128 * pct / 100) as u64;
        Self {
            refund_percentage: pct as u8,
            refund_amount,
            payment_amount: amount - refund_amount,
        }
    }
}

/// The banded curve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundCurve {
    bands: Vec<QualityBand>,
}

impl RefundCurve {
    /// POOR 0-49: 100%, BELOW_AVERAGE 50-64: 75%, AVERAGE 65-79: 35%, GOOD 80-100: 0%
    pub fn standard() -> Self {
        Self {
            bands: standard_bands(),
        }
    }

    /// Build a curve from bands, rejecting gaps, overlaps and bad percentages
    pub fn new(mut bands: Vec<QualityBand>) -> Result<Self> {
        bands.sort_by_key(|b| b.min);
        validate_bands(&bands)?;
        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[QualityBand] {
        &self.bands
    }

    /// Band containing `score`
    pub fn band(&self, score: u8) -> Result<&QualityBand> {
        if score > MAX_QUALITY_SCORE {
            return Err(ProtocolError::InvalidQualityScore { score });
        }
        self.bands
            .iter()
            .find(|b| b.contains(score))
            .ok_or(ProtocolError::InvalidQualityScore { score })
    }

    pub fn refund_percentage(&self, score: u8) -> Result<u8> {
        self.band(score).map(|b| b.refund_percentage)
    }

    /// Refund/payment split of `amount` at `score`
    pub fn resolution(&self, amount: u64, score: u8) -> Result<RefundSplit> {
        let pct = self.refund_percentage(score)?;
        Ok(RefundSplit::from_percentage(amount, pct))
    }
}

impl Default for RefundCurve {
    fn default() -> Self {
        Self::standard()
    }
}

pub fn standard_bands() -> Vec<QualityBand> {
    vec![
        QualityBand::new("poor", 0, 49, 100),
        QualityBand::new("below_average", 50, 64, 75),
        QualityBand::new("average", 65, 79, 35),
        QualityBand::new("good", 80, 100, 0),
    ]
}

/// Bands must start at 0, end at 100, and each start one past the previous end
pub fn validate_bands(bands: &[QualityBand]) -> Result<()> {
    let first = bands
        .first()
        .ok_or_else(|| ProtocolError::invalid_settings("refund curve has no bands"))?;
    if first.min != 0 {
        return Err(ProtocolError::invalid_settings("refund curve must start at score 0"));
    }
    for band in bands {
        if band.min > band.max {
            return Err(ProtocolError::invalid_settings(format!(
                "band {} has min {} above max {}",
                band.name, band.min, band.max
            )));
        }
        if band.refund_percentage > 100 {
            return Err(ProtocolError::invalid_settings(format!(
                "band {} refunds {}%",
                band.name, band.refund_percentage
            )));
        }
    }
    for pair in bands.windows(2) {
        if pair[0].max.checked_add(1) != Some(pair[1].min) {
            return Err(ProtocolError::invalid_settings(format!(
                "bands {} and {} are not contiguous",
                pair[0].name, pair[1].name
            )));
        }
    }
    match bands.last() {
        Some(last) if last.max == MAX_QUALITY_SCORE => Ok(()),
        _ => Err(ProtocolError::invalid_settings("refund curve must end at score 100")),
    }
}

/// Split with the standard curve
pub fn resolution(amount: u64, quality_score: u8) -> Result<RefundSplit> {
    RefundCurve::standard().resolution(amount, quality_score)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_UNIT: u64 = 1_000_000_000;

    #[test]
    fn test_band_percentages() {
        for q in 0..=49 {
            assert_eq!(resolution(ONE_UNIT, q).unwrap().refund_percentage, 100);
        }
        for q in 50..=64 {
            assert_eq!(resolution(ONE_UNIT, q).unwrap().refund_percentage, 75);
        }
        for q in 65..=79 {
            assert_eq!(resolution(ONE_UNIT, q).unwrap().refund_percentage, 35);
        }
        for q in 80..=100 {
            assert_eq!(resolution(ONE_UNIT, q).unwrap().refund_percentage, 0);
        }
    }

    #[test]
    fn test_bands_are_contiguous() {
        let bands = standard_bands();
        assert_eq!(bands[0].max + 1, bands[1].min);
        assert_eq!(bands[1].max + 1, bands[2].min);
        assert_eq!(bands[2].max + 1, bands[3].min);
        assert!(validate_bands(&bands).is_ok());
    }

    #[test]
    fn test_conservation() {
        let amounts = [0, 1, 3, 7, 99, 101, 333_333_333, ONE_UNIT, u64::MAX - 1, u64::MAX];
        for amount in amounts {
            for q in 0..=100 {
                let split = resolution(amount, q).unwrap();
                assert_eq!(split.refund_amount + split.payment_amount, amount);
            }
        }
    }

    #[test]
    fn test_scenarios() {
        let cases = [
            (30, ONE_UNIT, 0),
            (55, 750_000_000, 250_000_000),
            (70, 350_000_000, 650_000_000),
            (85, 0, ONE_UNIT),
        ];
        for (q, refund, payment) in cases {
            let split = resolution(ONE_UNIT, q).unwrap();
            assert_eq!(split.refund_amount, refund, "q={}", q);
            assert_eq!(split.payment_amount, payment, "q={}", q);
        }
    }

    #[test]
    fn test_remainder_goes_to_payment() {
        let split = resolution(3, 70).unwrap();
        assert_eq!(split.refund_amount, 1);
        assert_eq!(split.payment_amount, 2);
    }

    #[test]
    fn test_invalid_score() {
        assert_eq!(
            resolution(ONE_UNIT, 101),
            Err(ProtocolError::InvalidQualityScore { score: 101 })
        );
    }

    #[test]
    fn test_gapped_curve_rejected() {
        let bands = vec![
            QualityBand::new("low", 0, 40, 100),
            QualityBand::new("high", 42, 100, 0),
        ];
        assert!(RefundCurve::new(bands).is_err());

        let overlapping = vec![
            QualityBand::new("low", 0, 50, 100),
            QualityBand::new("high", 50, 100, 0),
        ];
        assert!(RefundCurve::new(overlapping).is_err());

        let short = vec![QualityBand::new("all", 0, 99, 10)];
        assert!(RefundCurve::new(short).is_err());
    }

    #[test]
    fn test_retuned_curve() {
        let curve = RefundCurve::new(vec![
            QualityBand::new("pass", 60, 100, 0),
            QualityBand::new("fail", 0, 59, 90),
        ])
        .unwrap();
        assert_eq!(curve.refund_percentage(59).unwrap(), 90);
        assert_eq!(curve.refund_percentage(60).unwrap(), 0);
    }
}
