//! Arbitra Types - Canonical domain types for the escrow & dispute protocol
//!
//! This crate contains all foundational types for Arbitra with zero dependencies
//! on other arbitra crates. It defines:
//!
//! - Account identity (32-byte addresses) and asset kinds
//! - The six protocol records (agents, agreements, oracle registry,
//!   reputation, blacklist, protocol config)
//! - Protocol events consumed by indexers and notifiers
//! - The typed error taxonomy
//!
//! # Invariants carried by these types
//!
//! 1. Agreement status is a closed enum; transitions are one-directional
//! 2. `successful_escrows + disputed_escrows <= total_escrows`
//! 3. `disputes_won + disputes_partial + disputes_lost <= disputes_filed <= total_transactions`
//! 4. Every failure is explicit and classified by kind

pub mod account;
pub mod records;
pub mod events;
pub mod error;

pub use account::*;
pub use records::*;
pub use events::*;
pub use error::*;

/// Version of the Arbitra types schema
pub const TYPES_VERSION: &str = "0.1.0";

/// Base units per whole unit of the native asset
pub const BASE_UNITS_PER_UNIT: u64 = 1_000_000_000;

/// Basis-point denominator
pub const BPS_DENOMINATOR: u64 = 10_000;
