//! Domain types for stake-pool analytics.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper (lamports -> SOL)
//! - Domain primitives: WalletAddress, PoolName, Month
//! - Action records, the closed action vocabulary and the immutable ActionLog
//! - Wallet-level enrichment records

pub mod action;
pub mod decimal;
pub mod enrichment;
pub mod primitives;

pub use action::{ActionClass, ActionKind, ActionLog, ActionRecord, RawActionRow};
pub use decimal::{Decimal, LAMPORTS_PER_SOL};
pub use enrichment::{
    FundSourceRecord, HoldingsRecord, ProtocolInteractionRecord, RawFundSourceRow,
    RawHoldingsRow, RawProtocolInteractionRow,
};
pub use primitives::{Month, MonthParseError, PoolName, WalletAddress};
