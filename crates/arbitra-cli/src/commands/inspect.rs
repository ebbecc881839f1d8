//! Offline commands: refund curve, trust levels, wire decoding

use anyhow::{bail, Context};
use arbitra_core::{trust_level, ProtocolSettings, RefundCurve};
use arbitra_types::{
    AgentIdentity, Agreement, BlacklistRegistry, EntityReputation, OracleRegistry, ProtocolConfig,
};
use arbitra_wire::{decode_record, Instruction};
use serde::Serialize;

use crate::display::{self, units};

/// Print the band and split for an amount at a quality score
pub fn refund(settings: &ProtocolSettings, amount: u64, score: u8) -> anyhow::Result<()> {
    let curve = RefundCurve::new(settings.refund_bands.clone())?;
    let band = curve.band(score)?;
    let split = curve.resolution(amount, score)?;

    display::section("Refund");
    display::kv("Quality score", &score.to_string());
    display::kv("Band", &format!("{} ({}..={})", band.name, band.min, band.max));
    display::kv("Refund", &format!("{}%", split.refund_percentage));
    display::kv("To agent", &units(split.refund_amount));
    display::kv("To counterpart", &units(split.payment_amount));
    Ok(())
}

pub fn trust(reputation: u64, stake: u64) {
    let level = trust_level(reputation, stake);
    display::section("Trust level");
    display::kv("Reputation", &reputation.to_string());
    display::kv("Stake", &units(stake));
    display::kv("Level", level.as_str());
}

fn decode_hex(data: &str) -> anyhow::Result<Vec<u8>> {
    let trimmed = data.trim().trim_start_matches("0x");
    hex::decode(trimmed).context("input is not hex")
}

pub fn decode_instruction(data: &str) -> anyhow::Result<()> {
    let bytes = decode_hex(data)?;
    let instruction = Instruction::decode(&bytes)?;
    display::section(&format!("Instruction: {}", instruction.name()));
    display::kv("Selector", &hex::encode(instruction.selector()));
    println!("{:#?}", instruction);
    Ok(())
}

fn print_json<T: Serialize>(record: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

/// Record kinds accepted by `decode-record`
pub const RECORD_KINDS: &[&str] = &[
    "agent",
    "agreement",
    "oracle-registry",
    "reputation",
    "blacklist",
    "config",
];

pub fn decode_record_hex(kind: &str, data: &str) -> anyhow::Result<()> {
    let bytes = decode_hex(data)?;
    match kind {
        "agent" => print_json(&decode_record::<AgentIdentity>(&bytes)?),
        "agreement" => print_json(&decode_record::<Agreement>(&bytes)?),
        "oracle-registry" => print_json(&decode_record::<OracleRegistry>(&bytes)?),
        "reputation" => print_json(&decode_record::<EntityReputation>(&bytes)?),
        "blacklist" => print_json(&decode_record::<BlacklistRegistry>(&bytes)?),
        "config" => print_json(&decode_record::<ProtocolConfig>(&bytes)?),
        other => bail!("unknown record kind {} (expected one of {})", other, RECORD_KINDS.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex_accepts_prefix() {
        assert_eq!(decode_hex("0x0aff").unwrap(), vec![0x0a, 0xff]);
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_unknown_kind() {
        assert!(decode_record_hex("wallet", "00").is_err());
    }

    #[test]
    fn test_decode_release_instruction() {
        let data = hex::encode(Instruction::ReleaseFunds.encode());
        assert!(decode_instruction(&data).is_ok());
    }
}
