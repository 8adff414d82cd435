//! Monthly per-pool rollups and market share.

use super::cohort::staker_count_series_incremental;
use super::position::{scan, PoolFilter, Totals};
use crate::domain::{ActionClass, ActionRecord, Decimal, Month, PoolName, WalletAddress};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Flows for one (month, pool) with the pool's running total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPoolAggregate {
    pub month: Month,
    pub pool: PoolName,
    pub deposit_sum: Decimal,
    pub withdraw_sum: Decimal,
    pub net_deposit: Decimal,
    pub cumulative_net_deposit: Decimal,
}

/// A per-(month, pool) value: a count or an amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPoolValue {
    pub month: Month,
    pub pool: PoolName,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketShareRow {
    pub month: Month,
    pub pool: PoolName,
    pub value: Decimal,
    pub share_pct: Decimal,
}

/// Numerator used for market share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShareMetric {
    NetDeposit,
    TransactionCount,
    StakerCount,
}

impl FromStr for ShareMetric {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "netdeposit" => Ok(ShareMetric::NetDeposit),
            "transactioncount" => Ok(ShareMetric::TransactionCount),
            "stakercount" => Ok(ShareMetric::StakerCount),
            _ => Err(()),
        }
    }
}

/// First active month per pool, and the last month seen across all pools.
fn pool_spans(
    months: impl Iterator<Item = (PoolName, Month)>,
) -> (BTreeMap<PoolName, Month>, Option<Month>) {
    let mut first: BTreeMap<PoolName, Month> = BTreeMap::new();
    let mut last: Option<Month> = None;
    for (pool, month) in months {
        first
            .entry(pool)
            .and_modify(|m| *m = (*m).min(month))
            .or_insert(month);
        last = Some(last.map_or(month, |l| l.max(month)));
    }
    (first, last)
}

/// Monthly deposit/withdraw sums per pool with a running net total.
///
/// Rows are dense: each pool has a row for every month from its first
/// counted action through the last month present in the filtered log, so
/// the running total is defined for every month a chart may show.
pub fn monthly_pool_aggregates(
    actions: &[ActionRecord],
    filter: &PoolFilter,
) -> Vec<MonthlyPoolAggregate> {
    let (rows, _) = scan(actions, None, filter);

    let mut flows: BTreeMap<(PoolName, Month), Totals> = BTreeMap::new();
    for row in &rows {
        flows
            .entry((row.record.pool.clone(), row.month))
            .or_default()
            .add(row.class, row.record.amount());
    }

    let (first, last) = pool_spans(flows.keys().cloned());
    let Some(last) = last else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (pool, start) in first {
        let mut cumulative = Decimal::zero();
        for month in Month::range_inclusive(start, last) {
            let totals = flows
                .get(&(pool.clone(), month))
                .copied()
                .unwrap_or_default();
            cumulative += totals.net();
            out.push(MonthlyPoolAggregate {
                month,
                pool: pool.clone(),
                deposit_sum: totals.deposit,
                withdraw_sum: totals.withdraw,
                net_deposit: totals.net(),
                cumulative_net_deposit: cumulative,
            });
        }
    }

    out.sort_by(|a, b| (a.month, &a.pool).cmp(&(b.month, &b.pool)));
    out
}

/// Running net deposit for `pool` at `month`; zero before the pool's first
/// action and carried forward past the last aggregated month.
pub fn cumulative_net_deposit_at(
    aggregates: &[MonthlyPoolAggregate],
    pool: &PoolName,
    month: Month,
) -> Decimal {
    aggregates
        .iter()
        .filter(|a| &a.pool == pool && a.month <= month)
        .max_by_key(|a| a.month)
        .map_or(Decimal::zero(), |a| a.cumulative_net_deposit)
}

/// Distinct transactions per (month, pool).
pub fn monthly_transaction_counts(
    actions: &[ActionRecord],
    filter: &PoolFilter,
) -> Vec<MonthlyPoolValue> {
    let (rows, _) = scan(actions, None, filter);
    let mut txs: BTreeMap<(Month, PoolName), BTreeSet<&str>> = BTreeMap::new();
    for row in &rows {
        txs.entry((row.month, row.record.pool.clone()))
            .or_default()
            .insert(row.record.transaction_id.as_str());
    }
    txs.into_iter()
        .map(|((month, pool), set)| MonthlyPoolValue {
            month,
            pool,
            value: Decimal::from_count(set.len()),
        })
        .collect()
}

/// Distinct depositing wallets per (month, pool).
pub fn monthly_unique_stakers(
    actions: &[ActionRecord],
    filter: &PoolFilter,
) -> Vec<MonthlyPoolValue> {
    let (rows, _) = scan(actions, None, filter);
    let mut wallets: BTreeMap<(Month, PoolName), BTreeSet<&WalletAddress>> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.class == ActionClass::Deposit) {
        wallets
            .entry((row.month, row.record.pool.clone()))
            .or_default()
            .insert(&row.record.wallet);
    }
    wallets
        .into_iter()
        .map(|((month, pool), set)| MonthlyPoolValue {
            month,
            pool,
            value: Decimal::from_count(set.len()),
        })
        .collect()
}

/// Wallets with a positive net position per (month, pool), from each pool's
/// first action through the last month in the log.
pub fn monthly_staker_counts(actions: &[ActionRecord], filter: &PoolFilter) -> Vec<MonthlyPoolValue> {
    let (rows, _) = scan(actions, None, filter);
    let (first, last) = pool_spans(rows.iter().map(|r| (r.record.pool.clone(), r.month)));
    let Some(last) = last else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (pool, start) in first {
        let series = staker_count_series_incremental(
            actions,
            start,
            last,
            &PoolFilter::Only(BTreeSet::from([pool.clone()])),
        );
        out.extend(series.into_iter().map(|(month, count)| MonthlyPoolValue {
            month,
            pool: pool.clone(),
            value: Decimal::from_count(count),
        }));
    }
    out.sort_by(|a, b| (a.month, &a.pool).cmp(&(b.month, &b.pool)));
    out
}

/// Each pool's share of the per-month total, in percent.
///
/// The denominator is recomputed per month. Months whose total is zero have
/// no defined share and are left out.
///
/// Cumulative net deposits can be negative, and shares are still the plain
/// ratio `value / total * 100`, so they keep summing to 100. When the month's
/// total is negative the signs flip: with +5 and -10 the shares are -100 and
/// 200, and the top pool is the one with the largest net outflow.
pub fn market_share(values: &[MonthlyPoolValue]) -> Vec<MarketShareRow> {
    let mut by_month: BTreeMap<Month, Vec<&MonthlyPoolValue>> = BTreeMap::new();
    for v in values {
        by_month.entry(v.month).or_default().push(v);
    }

    let mut out = Vec::new();
    for (month, mut rows) in by_month {
        let total: Decimal = rows.iter().map(|r| r.value).sum();
        if total.is_zero() {
            continue;
        }
        rows.sort_by(|a, b| a.pool.cmp(&b.pool));
        for row in rows {
            let Some(share_pct) = (row.value * Decimal::hundred()).checked_div(total) else {
                continue;
            };
            out.push(MarketShareRow {
                month,
                pool: row.pool.clone(),
                value: row.value,
                share_pct,
            });
        }
    }
    out
}

/// Market share for one of the supported numerators.
pub fn market_share_for(
    actions: &[ActionRecord],
    metric: ShareMetric,
    filter: &PoolFilter,
) -> Vec<MarketShareRow> {
    let values = match metric {
        ShareMetric::NetDeposit => monthly_pool_aggregates(actions, filter)
            .into_iter()
            .map(|a| MonthlyPoolValue {
                month: a.month,
                pool: a.pool,
                value: a.cumulative_net_deposit,
            })
            .collect(),
        ShareMetric::TransactionCount => monthly_transaction_counts(actions, filter),
        ShareMetric::StakerCount => monthly_staker_counts(actions, filter),
    };
    market_share(&values)
}

/// Pool with the highest share per month. Exact ties go to the
/// lexicographically first pool name.
pub fn top_share_by_month(shares: &[MarketShareRow]) -> BTreeMap<Month, PoolName> {
    let mut best: BTreeMap<Month, &MarketShareRow> = BTreeMap::new();
    for row in shares {
        best.entry(row.month)
            .and_modify(|current| {
                if row.share_pct > current.share_pct
                    || (row.share_pct == current.share_pct && row.pool < current.pool)
                {
                    *current = row;
                }
            })
            .or_insert(row);
    }
    best.into_iter()
        .map(|(month, row)| (month, row.pool.clone()))
        .collect()
}
