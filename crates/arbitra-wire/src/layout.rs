//! Record layouts
//!
//! `[8-byte tag][fixed prefix][length-prefixed strings][fixed suffix][bump]`,
//! tag = `sha256("account:<Name>")[..8]`. Decoders tolerate zero padding
//! after the bump, since record storage may be over-allocated.

use crate::codec::{Reader, Writer};
use crate::{Result, WireError};
use arbitra_crypto::record_tag;
use arbitra_types::{
    AgentIdentity, AgentType, Agreement, AgreementStatus, BlacklistRegistry, EntityReputation,
    EntityType, OracleCategory, OracleEntry, OracleRegistry, ProtocolConfig,
};

/// A record with a fixed binary layout
pub trait RecordLayout: Sized {
    /// Name hashed into the record tag
    const NAME: &'static str;

    fn write_fields(&self, w: &mut Writer);

    fn read_fields(r: &mut Reader<'_>) -> Result<Self>;
}

/// Encode a record with its tag
pub fn encode_record<R: RecordLayout>(record: &R) -> Vec<u8> {
    let mut w = Writer::new();
    w.raw(&record_tag(R::NAME));
    record.write_fields(&mut w);
    w.into_bytes()
}

/// Decode a record, checking its tag
pub fn decode_record<R: RecordLayout>(data: &[u8]) -> Result<R> {
    let mut r = Reader::new(data);
    if r.tag()? != record_tag(R::NAME) {
        return Err(WireError::TagMismatch { expected: R::NAME });
    }
    R::read_fields(&mut r)
}

fn discriminant<T>(field: &'static str, value: u8, parse: fn(u8) -> Option<T>) -> Result<T> {
    parse(value).ok_or(WireError::InvalidDiscriminant { field, value })
}

// ============================================================================
// AgentIdentity
// ============================================================================

impl RecordLayout for AgentIdentity {
    const NAME: &'static str = "AgentIdentity";

    fn write_fields(&self, w: &mut Writer) {
        w.account(&self.owner)
            .string(&self.name)
            .u8(self.agent_type.as_u8())
            .u64(self.reputation)
            .u64(self.stake_amount)
            .bool(self.is_active)
            .i64(self.created_at)
            .i64(self.last_active)
            .u64(self.total_escrows)
            .u64(self.successful_escrows)
            .u64(self.disputed_escrows)
            .u8(self.bump);
    }

    fn read_fields(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            owner: r.account()?,
            name: r.string("name")?,
            agent_type: discriminant("agent_type", r.u8()?, AgentType::from_u8)?,
            reputation: r.u64()?,
            stake_amount: r.u64()?,
            is_active: r.bool("is_active")?,
            created_at: r.i64()?,
            last_active: r.i64()?,
            total_escrows: r.u64()?,
            successful_escrows: r.u64()?,
            disputed_escrows: r.u64()?,
            bump: r.u8()?,
        })
    }
}

// ============================================================================
// Agreement
// ============================================================================

impl RecordLayout for Agreement {
    const NAME: &'static str = "Escrow";

    fn write_fields(&self, w: &mut Writer) {
        w.account(&self.agent)
            .account(&self.counterpart)
            .u64(self.amount)
            .u8(self.status.as_u8())
            .i64(self.created_at)
            .i64(self.expires_at)
            .string(&self.transaction_id)
            .asset(&self.asset)
            .option(self.quality_score, |w, v| {
                w.u8(v);
            })
            .option(self.refund_percentage, |w, v| {
                w.u8(v);
            })
            .option(self.disputed_by, |w, v| {
                w.account(&v);
            })
            .option(self.disputed_at, |w, v| {
                w.i64(v);
            })
            .option(self.resolved_at, |w, v| {
                w.i64(v);
            })
            .u8(self.bump);
    }

    fn read_fields(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            agent: r.account()?,
            counterpart: r.account()?,
            amount: r.u64()?,
            status: discriminant("status", r.u8()?, AgreementStatus::from_u8)?,
            created_at: r.i64()?,
            expires_at: r.i64()?,
            transaction_id: r.string("transaction_id")?,
            asset: r.asset()?,
            quality_score: r.option("quality_score", |r| r.u8())?,
            refund_percentage: r.option("refund_percentage", |r| r.u8())?,
            disputed_by: r.option("disputed_by", |r| r.account())?,
            disputed_at: r.option("disputed_at", |r| r.i64())?,
            resolved_at: r.option("resolved_at", |r| r.i64())?,
            bump: r.u8()?,
        })
    }
}

// ============================================================================
// OracleRegistry
// ============================================================================

const ORACLE_ENTRY_LEN: usize = 32 + 1 + 2 + 8 + 1 + 8 + 8;

impl RecordLayout for OracleRegistry {
    const NAME: &'static str = "OracleRegistry";

    fn write_fields(&self, w: &mut Writer) {
        w.account(&self.admin).u32(self.oracles.len() as u32);
        for o in &self.oracles {
            w.account(&o.oracle)
                .u8(o.category.as_u8())
                .u16(o.weight)
                .u64(o.bond)
                .u8(o.violation_count)
                .u64(o.pending_rewards)
                .u64(o.total_rewards);
        }
        w.u8(self.min_consensus)
            .u8(self.max_score_deviation)
            .u8(self.violation_threshold)
            .i64(self.created_at)
            .i64(self.updated_at)
            .u8(self.bump);
    }

    fn read_fields(r: &mut Reader<'_>) -> Result<Self> {
        let admin = r.account()?;
        let count = r.u32()? as usize;
        let needed = count.saturating_mul(ORACLE_ENTRY_LEN);
        if needed > r.remaining() {
            return Err(WireError::UnexpectedEnd {
                needed,
                remaining: r.remaining(),
            });
        }
        let mut oracles = Vec::with_capacity(count);
        for _ in 0..count {
            oracles.push(OracleEntry {
                oracle: r.account()?,
                category: discriminant("category", r.u8()?, OracleCategory::from_u8)?,
                weight: r.u16()?,
                bond: r.u64()?,
                violation_count: r.u8()?,
                pending_rewards: r.u64()?,
                total_rewards: r.u64()?,
            });
        }
        Ok(Self {
            admin,
            oracles,
            min_consensus: r.u8()?,
            max_score_deviation: r.u8()?,
            violation_threshold: r.u8()?,
            created_at: r.i64()?,
            updated_at: r.i64()?,
            bump: r.u8()?,
        })
    }
}

// ============================================================================
// EntityReputation
// ============================================================================

impl RecordLayout for EntityReputation {
    const NAME: &'static str = "EntityReputation";

    fn write_fields(&self, w: &mut Writer) {
        w.account(&self.entity)
            .u8(self.entity_type.as_u8())
            .u64(self.total_transactions)
            .u64(self.disputes_filed)
            .u64(self.disputes_won)
            .u64(self.disputes_partial)
            .u64(self.disputes_lost)
            .u8(self.average_quality_received)
            .u64(self.quality_samples)
            .u16(self.reputation_score)
            .i64(self.created_at)
            .i64(self.last_updated)
            .u8(self.bump);
    }

    fn read_fields(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            entity: r.account()?,
            entity_type: discriminant("entity_type", r.u8()?, EntityType::from_u8)?,
            total_transactions: r.u64()?,
            disputes_filed: r.u64()?,
            disputes_won: r.u64()?,
            disputes_partial: r.u64()?,
            disputes_lost: r.u64()?,
            average_quality_received: r.u8()?,
            quality_samples: r.u64()?,
            reputation_score: r.u16()?,
            created_at: r.i64()?,
            last_updated: r.i64()?,
            bump: r.u8()?,
        })
    }
}

// ============================================================================
// BlacklistRegistry / ProtocolConfig
// ============================================================================

impl RecordLayout for BlacklistRegistry {
    const NAME: &'static str = "BlacklistRegistry";

    fn write_fields(&self, w: &mut Writer) {
        w.account(&self.authority)
            .raw(&self.root)
            .u64(self.leaf_count)
            .i64(self.last_updated)
            .u8(self.bump);
    }

    fn read_fields(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            authority: r.account()?,
            root: r.bytes32()?,
            leaf_count: r.u64()?,
            last_updated: r.i64()?,
            bump: r.u8()?,
        })
    }
}

impl RecordLayout for ProtocolConfig {
    const NAME: &'static str = "ProtocolConfig";

    fn write_fields(&self, w: &mut Writer) {
        w.account(&self.admin)
            .account(&self.treasury)
            .u16(self.agreement_fee_bps)
            .u16(self.dispute_fee_bps)
            .u64(self.dispute_base_fee)
            .u64(self.identity_fee)
            .u64(self.total_fees_collected)
            .bool(self.is_active)
            .i64(self.created_at)
            .i64(self.updated_at)
            .u8(self.bump);
    }

    fn read_fields(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            admin: r.account()?,
            treasury: r.account()?,
            agreement_fee_bps: r.u16()?,
            dispute_fee_bps: r.u16()?,
            dispute_base_fee: r.u64()?,
            identity_fee: r.u64()?,
            total_fees_collected: r.u64()?,
            is_active: r.bool("is_active")?,
            created_at: r.i64()?,
            updated_at: r.i64()?,
            bump: r.u8()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbitra_types::{AccountId, Asset};

    fn agent() -> AgentIdentity {
        AgentIdentity {
            owner: AccountId::new([7; 32]),
            name: "bot".to_string(),
            agent_type: AgentType::Trading,
            reputation: 500,
            stake_amount: 100_000_000,
            is_active: true,
            created_at: 10,
            last_active: 20,
            total_escrows: 3,
            successful_escrows: 2,
            disputed_escrows: 1,
            bump: 254,
        }
    }

    #[test]
    fn test_agent_identity_layout() {
        let bytes = encode_record(&agent());
        assert_eq!(&bytes[..8], &record_tag("AgentIdentity"));
        assert_eq!(&bytes[8..40], &[7u8; 32]);
        assert_eq!(&bytes[40..44], &3u32.to_le_bytes());
        assert_eq!(&bytes[44..47], b"bot");
        assert_eq!(bytes[47], 0);
        // 8 tag + 32 + 4 + 3 + 1 + 8 + 8 + 1 + 8 + 8 + 8 + 8 + 8 + 1
        assert_eq!(bytes.len(), 106);
        assert_eq!(*bytes.last().unwrap(), 254);
        assert_eq!(decode_record::<AgentIdentity>(&bytes).unwrap(), agent());
    }

    #[test]
    fn test_padding_tolerated() {
        let mut bytes = encode_record(&agent());
        bytes.extend_from_slice(&[0u8; 16]);
        assert_eq!(decode_record::<AgentIdentity>(&bytes).unwrap(), agent());
    }

    #[test]
    fn test_every_truncation_is_rejected() {
        let bytes = encode_record(&agent());
        for len in 0..bytes.len() {
            assert!(decode_record::<AgentIdentity>(&bytes[..len]).is_err(), "len {}", len);
        }
    }

    #[test]
    fn test_name_length_beyond_buffer() {
        let mut bytes = encode_record(&agent());
        bytes[40..44].copy_from_slice(&500u32.to_le_bytes());
        assert!(matches!(
            decode_record::<AgentIdentity>(&bytes),
            Err(WireError::UnexpectedEnd { needed: 500, .. })
        ));
    }

    #[test]
    fn test_tag_mismatch() {
        let bytes = encode_record(&agent());
        assert_eq!(
            decode_record::<ProtocolConfig>(&bytes),
            Err(WireError::TagMismatch { expected: "ProtocolConfig" })
        );
    }

    #[test]
    fn test_agreement_optional_fields() {
        let agreement = Agreement {
            agent: AccountId::new([1; 32]),
            counterpart: AccountId::new([2; 32]),
            amount: 1_000,
            status: AgreementStatus::Resolved,
            created_at: 1,
            expires_at: 3601,
            transaction_id: "tx-1".to_string(),
            asset: Asset::External(AccountId::new([3; 32])),
            quality_score: Some(70),
            refund_percentage: Some(35),
            disputed_by: Some(AccountId::new([2; 32])),
            disputed_at: Some(5),
            resolved_at: None,
            bump: 250,
        };
        let bytes = encode_record(&agreement);
        assert_eq!(decode_record::<Agreement>(&bytes).unwrap(), agreement);
    }

    #[test]
    fn test_oracle_count_checked_before_allocation() {
        let registry = OracleRegistry {
            admin: AccountId::new([1; 32]),
            oracles: vec![],
            min_consensus: 3,
            max_score_deviation: 15,
            violation_threshold: 7,
            created_at: 0,
            updated_at: 0,
            bump: 255,
        };
        let mut bytes = encode_record(&registry);
        bytes[40..44].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode_record::<OracleRegistry>(&bytes),
            Err(WireError::UnexpectedEnd { .. })
        ));
    }
}
