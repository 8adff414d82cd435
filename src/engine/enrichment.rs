//! Cross-tabulation of current stakers against wallet enrichment tables.

use crate::domain::{
    Decimal, FundSourceRecord, HoldingsRecord, Month, ProtocolInteractionRecord, WalletAddress,
};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Label for stakers the enrichment table knows nothing about.
pub const NO_DATA_CATEGORY: &str = "inactive / no data";

/// Output category of a cross-tabulation. The sentinel sorts last.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Known(String),
    NoData,
}

impl Category {
    pub fn label(&self) -> &str {
        match self {
            Category::Known(label) => label,
            Category::NoData => NO_DATA_CATEGORY,
        }
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// A wallet-keyed enrichment table that assigns at most one category per
/// (wallet, month).
pub trait EnrichmentTable {
    fn name(&self) -> &'static str;

    fn category(&self, wallet: &WalletAddress, month: Month) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTabRow {
    pub category: Category,
    pub stakers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTab {
    pub table: &'static str,
    pub month: Month,
    pub total: usize,
    pub rows: Vec<CrossTabRow>,
}

/// Count stakers per category. Every staker lands in exactly one row; stakers
/// missing from the table, or an empty table, map to [`Category::NoData`].
pub fn cross_tabulate<'a, I>(stakers: I, table: &dyn EnrichmentTable, month: Month) -> CrossTab
where
    I: IntoIterator<Item = &'a WalletAddress>,
{
    let mut counts: BTreeMap<Category, usize> = BTreeMap::new();
    let mut total = 0usize;
    for wallet in stakers {
        let category = table
            .category(wallet, month)
            .map_or(Category::NoData, Category::Known);
        *counts.entry(category).or_insert(0) += 1;
        total += 1;
    }

    debug!(
        table = table.name(),
        month = %month,
        total,
        no_data = counts.get(&Category::NoData).copied().unwrap_or(0),
        "cross-tabulated stakers"
    );

    CrossTab {
        table: table.name(),
        month,
        total,
        rows: counts
            .into_iter()
            .map(|(category, stakers)| CrossTabRow { category, stakers })
            .collect(),
    }
}

/// SOL balance band. Labels sort lexicographically in band order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HoldingsBucket {
    Under1,
    From1To10,
    From10To100,
    From100To1k,
    AtLeast1k,
}

impl HoldingsBucket {
    pub fn for_balance(balance: Decimal) -> Self {
        if balance < Decimal::from_count(1) {
            HoldingsBucket::Under1
        } else if balance < Decimal::from_count(10) {
            HoldingsBucket::From1To10
        } else if balance < Decimal::from_count(100) {
            HoldingsBucket::From10To100
        } else if balance < Decimal::from_count(1_000) {
            HoldingsBucket::From100To1k
        } else {
            HoldingsBucket::AtLeast1k
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HoldingsBucket::Under1 => "a. < 1 SOL",
            HoldingsBucket::From1To10 => "b. 1-10 SOL",
            HoldingsBucket::From10To100 => "c. 10-100 SOL",
            HoldingsBucket::From100To1k => "d. 100-1k SOL",
            HoldingsBucket::AtLeast1k => "e. >= 1k SOL",
        }
    }
}

/// SOL holdings per wallet per month. The first record for a (wallet, month)
/// wins.
#[derive(Debug, Clone, Default)]
pub struct HoldingsTable {
    balances: HashMap<(WalletAddress, Month), Decimal>,
}

impl HoldingsTable {
    pub fn new(records: &[HoldingsRecord]) -> Self {
        let mut balances = HashMap::new();
        for r in records {
            balances
                .entry((r.wallet.clone(), r.month))
                .or_insert(r.sol_balance);
        }
        Self { balances }
    }
}

impl EnrichmentTable for HoldingsTable {
    fn name(&self) -> &'static str {
        "holdings"
    }

    fn category(&self, wallet: &WalletAddress, month: Month) -> Option<String> {
        self.balances
            .get(&(wallet.clone(), month))
            .map(|b| HoldingsBucket::for_balance(*b).label().to_string())
    }
}

/// Fund-source attribution per wallet, independent of month. The first
/// record for a wallet wins.
#[derive(Debug, Clone, Default)]
pub struct FundSourceTable {
    sources: HashMap<WalletAddress, String>,
}

impl FundSourceTable {
    pub fn new(records: &[FundSourceRecord]) -> Self {
        let mut sources = HashMap::new();
        for r in records {
            sources
                .entry(r.wallet.clone())
                .or_insert_with(|| r.source.clone());
        }
        Self { sources }
    }
}

impl EnrichmentTable for FundSourceTable {
    fn name(&self) -> &'static str {
        "fund-sources"
    }

    fn category(&self, wallet: &WalletAddress, _month: Month) -> Option<String> {
        self.sources.get(wallet).cloned()
    }
}

/// Protocol interactions per wallet per month.
///
/// A wallet's category is the protocol it interacted with most that month;
/// exact ties go to the lexicographically first protocol name.
#[derive(Debug, Clone, Default)]
pub struct ProtocolTable {
    counts: HashMap<(WalletAddress, Month), BTreeMap<String, u64>>,
}

impl ProtocolTable {
    pub fn new(records: &[ProtocolInteractionRecord]) -> Self {
        let mut counts: HashMap<(WalletAddress, Month), BTreeMap<String, u64>> = HashMap::new();
        for r in records {
            *counts
                .entry((r.wallet.clone(), r.month))
                .or_default()
                .entry(r.protocol.clone())
                .or_insert(0) += r.interaction_count;
        }
        Self { counts }
    }
}

impl EnrichmentTable for ProtocolTable {
    fn name(&self) -> &'static str {
        "protocols"
    }

    fn category(&self, wallet: &WalletAddress, month: Month) -> Option<String> {
        let per_protocol = self.counts.get(&(wallet.clone(), month))?;
        // BTreeMap iterates names ascending; only a strictly larger count
        // replaces the current pick.
        let mut best: Option<(&String, u64)> = None;
        for (protocol, count) in per_protocol {
            if *count == 0 {
                continue;
            }
            if best.map_or(true, |(_, c)| *count > c) {
                best = Some((protocol, *count));
            }
        }
        best.map(|(protocol, _)| protocol.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(s: &str) -> WalletAddress {
        WalletAddress::new(s)
    }

    fn month(s: &str) -> Month {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_table_degrades_to_no_data() {
        let stakers = [wallet("W1"), wallet("W2")];
        let tab = cross_tabulate(&stakers, &HoldingsTable::default(), month("2022-01"));
        assert_eq!(tab.total, 2);
        assert_eq!(tab.rows.len(), 1);
        assert_eq!(tab.rows[0].category, Category::NoData);
        assert_eq!(tab.rows[0].stakers, 2);
    }

    #[test]
    fn test_protocol_tie_breaks_by_name() {
        let m = month("2022-01");
        let table = ProtocolTable::new(&[
            ProtocolInteractionRecord {
                wallet: wallet("W1"),
                month: m,
                protocol: "Raydium".to_string(),
                interaction_count: 4,
            },
            ProtocolInteractionRecord {
                wallet: wallet("W1"),
                month: m,
                protocol: "Orca".to_string(),
                interaction_count: 4,
            },
        ]);
        assert_eq!(table.category(&wallet("W1"), m).as_deref(), Some("Orca"));
        assert_eq!(table.category(&wallet("W1"), month("2022-02")), None);
    }

    #[test]
    fn test_holdings_bucket_labels() {
        let d = |s: &str| Decimal::from_str_canonical(s).unwrap();
        assert_eq!(HoldingsBucket::for_balance(d("0.5")).label(), "a. < 1 SOL");
        assert_eq!(HoldingsBucket::for_balance(d("1")).label(), "b. 1-10 SOL");
        assert_eq!(HoldingsBucket::for_balance(d("5000")).label(), "e. >= 1k SOL");
    }

    #[test]
    fn test_category_serializes_as_label() {
        let json = serde_json::to_string(&Category::NoData).unwrap();
        assert_eq!(json, "\"inactive / no data\"");
    }
}
