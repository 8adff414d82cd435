//! Wallet-level enrichment records joined against staker sets.

use crate::domain::{Decimal, Month, WalletAddress};
use crate::error::DataIntegrityError;
use serde::{Deserialize, Serialize};

/// SOL held by a wallet in a given month, as delivered by a data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHoldingsRow {
    #[serde(alias = "address")]
    pub wallet_address: String,
    pub month: String,
    pub sol_balance: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldingsRecord {
    pub wallet: WalletAddress,
    pub month: Month,
    pub sol_balance: Decimal,
}

/// Where a wallet's funds originated (exchange, bridge, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFundSourceRow {
    #[serde(alias = "address")]
    pub wallet_address: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundSourceRecord {
    pub wallet: WalletAddress,
    pub source: String,
}

/// Number of interactions a wallet had with a protocol in a month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProtocolInteractionRow {
    #[serde(alias = "address")]
    pub wallet_address: String,
    pub month: String,
    pub protocol: String,
    pub interaction_count: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolInteractionRecord {
    pub wallet: WalletAddress,
    pub month: Month,
    pub protocol: String,
    pub interaction_count: u64,
}

fn malformed(wallet: &str, field: &'static str, reason: String) -> DataIntegrityError {
    DataIntegrityError::MalformedRecord {
        record: wallet.trim().to_string(),
        field,
        reason,
    }
}

fn require_wallet(raw: &str) -> Result<WalletAddress, DataIntegrityError> {
    if raw.trim().is_empty() {
        return Err(malformed(raw, "wallet_address", "empty".to_string()));
    }
    Ok(WalletAddress::new(raw))
}

fn parse_month(wallet: &str, raw: &str) -> Result<Month, DataIntegrityError> {
    // Date-typed month columns arrive as "YYYY-MM-01"; keep the month part.
    let trimmed = raw.trim();
    let candidate = trimmed.get(..7).unwrap_or(trimmed);
    candidate
        .parse::<Month>()
        .map_err(|e| malformed(wallet, "month", e.to_string()))
}

impl HoldingsRecord {
    pub fn try_from_raw(row: &RawHoldingsRow) -> Result<Self, DataIntegrityError> {
        let wallet = require_wallet(&row.wallet_address)?;
        let month = parse_month(&row.wallet_address, &row.month)?;
        let sol_balance = Decimal::from_str_canonical(&row.sol_balance)
            .ok()
            .filter(|d| !d.is_negative())
            .ok_or_else(|| {
                malformed(
                    &row.wallet_address,
                    "sol_balance",
                    format!("not a non-negative number '{}'", row.sol_balance),
                )
            })?;
        Ok(Self {
            wallet,
            month,
            sol_balance,
        })
    }

    pub fn to_raw(&self) -> RawHoldingsRow {
        RawHoldingsRow {
            wallet_address: self.wallet.to_string(),
            month: self.month.to_string(),
            sol_balance: self.sol_balance.to_canonical_string(),
        }
    }
}

impl FundSourceRecord {
    pub fn try_from_raw(row: &RawFundSourceRow) -> Result<Self, DataIntegrityError> {
        let wallet = require_wallet(&row.wallet_address)?;
        let source = row.source.trim();
        if source.is_empty() {
            return Err(malformed(&row.wallet_address, "source", "empty".to_string()));
        }
        Ok(Self {
            wallet,
            source: source.to_string(),
        })
    }

    pub fn to_raw(&self) -> RawFundSourceRow {
        RawFundSourceRow {
            wallet_address: self.wallet.to_string(),
            source: self.source.clone(),
        }
    }
}

impl ProtocolInteractionRecord {
    pub fn try_from_raw(row: &RawProtocolInteractionRow) -> Result<Self, DataIntegrityError> {
        let wallet = require_wallet(&row.wallet_address)?;
        let month = parse_month(&row.wallet_address, &row.month)?;
        let protocol = row.protocol.trim();
        if protocol.is_empty() {
            return Err(malformed(&row.wallet_address, "protocol", "empty".to_string()));
        }
        let interaction_count = row.interaction_count.trim().parse::<u64>().map_err(|_| {
            malformed(
                &row.wallet_address,
                "interaction_count",
                format!("not a count '{}'", row.interaction_count),
            )
        })?;
        Ok(Self {
            wallet,
            month,
            protocol: protocol.to_string(),
            interaction_count,
        })
    }

    pub fn to_raw(&self) -> RawProtocolInteractionRow {
        RawProtocolInteractionRow {
            wallet_address: self.wallet.to_string(),
            month: self.month.to_string(),
            protocol: self.protocol.clone(),
            interaction_count: self.interaction_count.to_string(),
        }
    }
}
