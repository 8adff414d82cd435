//! Stake-pool action records and the immutable action log.

use crate::domain::{Decimal, Month, PoolName, WalletAddress};
use crate::error::DataIntegrityError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Whether an action grows or shrinks a wallet's staked position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionClass {
    Deposit,
    Withdraw,
}

/// Action name as reported by the stake-pool program.
///
/// The deposit and withdraw vocabularies are closed. Anything else is kept as
/// `Other` and never contributes to a position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
    Deposit,
    DepositStake,
    DepositDao,
    DepositDaoStake,
    DepositDaoWithReferrer,
    Withdraw,
    WithdrawStake,
    WithdrawDao,
    WithdrawDaoStake,
    Claim,
    OrderUnstake,
    Other(String),
}

impl ActionKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "deposit" => ActionKind::Deposit,
            "deposit_stake" => ActionKind::DepositStake,
            "deposit_dao" => ActionKind::DepositDao,
            "deposit_dao_stake" => ActionKind::DepositDaoStake,
            "deposit_dao_with_referrer" => ActionKind::DepositDaoWithReferrer,
            "withdraw" => ActionKind::Withdraw,
            "withdraw_stake" => ActionKind::WithdrawStake,
            "withdraw_dao" => ActionKind::WithdrawDao,
            "withdraw_dao_stake" => ActionKind::WithdrawDaoStake,
            "claim" => ActionKind::Claim,
            "order_unstake" => ActionKind::OrderUnstake,
            other => ActionKind::Other(other.to_string()),
        }
    }

    pub fn class(&self) -> Option<ActionClass> {
        match self {
            ActionKind::Deposit
            | ActionKind::DepositStake
            | ActionKind::DepositDao
            | ActionKind::DepositDaoStake
            | ActionKind::DepositDaoWithReferrer => Some(ActionClass::Deposit),
            ActionKind::Withdraw
            | ActionKind::WithdrawStake
            | ActionKind::WithdrawDao
            | ActionKind::WithdrawDaoStake
            | ActionKind::Claim
            | ActionKind::OrderUnstake => Some(ActionClass::Withdraw),
            ActionKind::Other(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Deposit => "deposit",
            ActionKind::DepositStake => "deposit_stake",
            ActionKind::DepositDao => "deposit_dao",
            ActionKind::DepositDaoStake => "deposit_dao_stake",
            ActionKind::DepositDaoWithReferrer => "deposit_dao_with_referrer",
            ActionKind::Withdraw => "withdraw",
            ActionKind::WithdrawStake => "withdraw_stake",
            ActionKind::WithdrawDao => "withdraw_dao",
            ActionKind::WithdrawDaoStake => "withdraw_dao_stake",
            ActionKind::Claim => "claim",
            ActionKind::OrderUnstake => "order_unstake",
            ActionKind::Other(name) => name,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action row as delivered by a data source, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawActionRow {
    #[serde(alias = "tx_id")]
    pub transaction_id: String,
    #[serde(alias = "block_timestamp")]
    pub timestamp: String,
    #[serde(alias = "address")]
    pub wallet_address: String,
    #[serde(alias = "stake_pool_name")]
    pub pool_name: String,
    pub action: String,
    pub amount: String,
    pub succeeded: String,
}

/// One validated on-chain stake-pool interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    pub wallet: WalletAddress,
    pub pool: PoolName,
    pub action: ActionKind,
    /// Amount in lamports.
    pub lamports: u64,
    pub succeeded: bool,
}

impl ActionRecord {
    /// Validate a raw row. Any unparseable field fails the row.
    pub fn try_from_raw(row: &RawActionRow) -> Result<Self, DataIntegrityError> {
        let tx = row.transaction_id.trim();
        let malformed = |field: &'static str, reason: String| DataIntegrityError::MalformedRecord {
            record: tx.to_string(),
            field,
            reason,
        };

        if tx.is_empty() {
            return Err(malformed("transaction_id", "empty".to_string()));
        }
        if row.wallet_address.trim().is_empty() {
            return Err(malformed("wallet_address", "empty".to_string()));
        }
        if row.pool_name.trim().is_empty() {
            return Err(malformed("pool_name", "empty".to_string()));
        }

        let timestamp = parse_timestamp(&row.timestamp)
            .ok_or_else(|| malformed("timestamp", format!("unparseable '{}'", row.timestamp)))?;
        let lamports = parse_lamports(&row.amount)
            .ok_or_else(|| malformed("amount", format!("not a lamport amount '{}'", row.amount)))?;
        let succeeded = parse_bool(&row.succeeded)
            .ok_or_else(|| malformed("succeeded", format!("not a boolean '{}'", row.succeeded)))?;

        Ok(ActionRecord {
            transaction_id: tx.to_string(),
            timestamp,
            wallet: WalletAddress::new(&row.wallet_address),
            pool: PoolName::canonical(&row.pool_name),
            action: ActionKind::parse(&row.action),
            lamports,
            succeeded,
        })
    }

    pub fn to_raw(&self) -> RawActionRow {
        RawActionRow {
            transaction_id: self.transaction_id.clone(),
            timestamp: self.timestamp.to_rfc3339(),
            wallet_address: self.wallet.as_str().to_string(),
            pool_name: self.pool.as_str().to_string(),
            action: self.action.as_str().to_string(),
            amount: self.lamports.to_string(),
            succeeded: self.succeeded.to_string(),
        }
    }

    pub fn month(&self) -> Month {
        Month::of(self.timestamp.date_naive())
    }

    pub fn class(&self) -> Option<ActionClass> {
        self.action.class()
    }

    /// Amount in SOL.
    pub fn amount(&self) -> Decimal {
        Decimal::from_lamports(self.lamports)
    }
}

/// Parse the timestamp shapes the analytics sources emit. Naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Lamports are whole numbers. A zero fractional part (`"5000.0"`) is accepted
/// because query engines often render integers as floats; anything else is not.
fn parse_lamports(raw: &str) -> Option<u64> {
    let s = raw.trim();
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac_part.bytes().all(|b| b == b'0') {
        return None;
    }
    int_part.parse::<u64>().ok()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "t" | "yes" => Some(true),
        "false" | "0" | "f" | "no" => Some(false),
        _ => None,
    }
}

/// The full, immutable set of action records from one refresh.
///
/// Records are kept in a deterministic order and the log carries a content
/// fingerprint so derived results can be memoized per refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLog {
    records: Vec<ActionRecord>,
    version: String,
    pools: BTreeSet<PoolName>,
    month_span: Option<(Month, Month)>,
}

impl ActionLog {
    pub fn new(mut records: Vec<ActionRecord>) -> Self {
        records.sort_by(|a, b| {
            (a.timestamp, &a.transaction_id, &a.wallet, &a.pool, &a.action, a.lamports)
                .cmp(&(b.timestamp, &b.transaction_id, &b.wallet, &b.pool, &b.action, b.lamports))
        });
        let version = compute_version(&records);
        let pools = records.iter().map(|r| r.pool.clone()).collect();
        let mut months = records.iter().filter(|r| r.succeeded).map(|r| r.month());
        let month_span = months
            .next()
            .map(|first| months.fold((first, first), |(lo, hi), m| (lo.min(m), hi.max(m))));
        Self {
            records,
            version,
            pools,
            month_span,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Validate a batch of raw rows. One malformed row fails the batch.
    pub fn from_raw(rows: &[RawActionRow]) -> Result<Self, DataIntegrityError> {
        let records = rows
            .iter()
            .map(ActionRecord::try_from_raw)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(records))
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct pool names present in the log.
    pub fn pools(&self) -> &BTreeSet<PoolName> {
        &self.pools
    }

    /// First and last month that carry a successful record.
    pub fn month_span(&self) -> Option<(Month, Month)> {
        self.month_span
    }
}

fn compute_version(records: &[ActionRecord]) -> String {
    use sha2::{Digest, Sha256};

    fn hash_var(hasher: &mut Sha256, data: &str) {
        hasher.update((data.len() as u32).to_le_bytes());
        hasher.update(data.as_bytes());
    }

    let mut hasher = Sha256::new();
    hasher.update((records.len() as u64).to_le_bytes());
    for r in records {
        hash_var(&mut hasher, &r.transaction_id);
        hasher.update(r.timestamp.timestamp_millis().to_le_bytes());
        hash_var(&mut hasher, r.wallet.as_str());
        hash_var(&mut hasher, r.pool.as_str());
        hash_var(&mut hasher, r.action.as_str());
        hasher.update(r.lamports.to_le_bytes());
        hasher.update([r.succeeded as u8]);
    }
    hex::encode(&hasher.finalize()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(amount: &str) -> RawActionRow {
        RawActionRow {
            transaction_id: "tx1".to_string(),
            timestamp: "2022-01-15 10:30:00.000".to_string(),
            wallet_address: "Wa11et1".to_string(),
            pool_name: "marinade".to_string(),
            action: "DEPOSIT".to_string(),
            amount: amount.to_string(),
            succeeded: "TRUE".to_string(),
        }
    }

    #[test]
    fn test_closed_vocabulary_classification() {
        for name in [
            "deposit",
            "deposit_stake",
            "deposit_dao",
            "deposit_dao_stake",
            "deposit_dao_with_referrer",
        ] {
            assert_eq!(ActionKind::parse(name).class(), Some(ActionClass::Deposit), "{name}");
        }
        for name in [
            "withdraw",
            "withdraw_stake",
            "withdraw_dao",
            "withdraw_dao_stake",
            "claim",
            "order_unstake",
        ] {
            assert_eq!(ActionKind::parse(name).class(), Some(ActionClass::Withdraw), "{name}");
        }
        assert_eq!(ActionKind::parse("stake_boost_bonus").class(), None);
    }

    #[test]
    fn test_try_from_raw_normalizes_fields() {
        let record = ActionRecord::try_from_raw(&raw("5000000000")).unwrap();
        assert_eq!(record.pool.as_str(), "Marinade");
        assert_eq!(record.action, ActionKind::Deposit);
        assert_eq!(record.amount().to_canonical_string(), "5");
        assert_eq!(record.month().to_string(), "2022-01");
        assert!(record.succeeded);
    }

    #[test]
    fn test_float_rendered_integer_amount_is_accepted() {
        let record = ActionRecord::try_from_raw(&raw("5000000000.0")).unwrap();
        assert_eq!(record.lamports, 5_000_000_000);
    }

    #[test]
    fn test_malformed_amount_is_rejected() {
        for bad in ["abc", "", "-5", "1.5", "1e9", "NaN"] {
            let err = ActionRecord::try_from_raw(&raw(bad)).unwrap_err();
            match err {
                DataIntegrityError::MalformedRecord { field, .. } => assert_eq!(field, "amount"),
            }
        }
    }

    #[test]
    fn test_timestamp_shapes() {
        assert!(parse_timestamp("2022-01-15T10:30:00Z").is_some());
        assert!(parse_timestamp("2022-01-15 10:30:00").is_some());
        assert!(parse_timestamp("2022-01-15T10:30:00.123").is_some());
        assert!(parse_timestamp("2022-01-15").is_some());
        assert!(parse_timestamp("15/01/2022").is_none());
    }

    #[test]
    fn test_batch_fails_on_single_bad_row() {
        let rows = vec![raw("1000"), raw("oops")];
        assert!(ActionLog::from_raw(&rows).is_err());
    }

    #[test]
    fn test_version_is_order_independent() {
        let mut a = raw("1");
        a.transaction_id = "a".to_string();
        let mut b = raw("2");
        b.transaction_id = "b".to_string();

        let log1 = ActionLog::from_raw(&[a.clone(), b.clone()]).unwrap();
        let log2 = ActionLog::from_raw(&[b, a]).unwrap();
        assert_eq!(log1.version(), log2.version());
        assert_eq!(log1.records(), log2.records());
        assert_ne!(log1.version(), ActionLog::empty().version());
    }
}
