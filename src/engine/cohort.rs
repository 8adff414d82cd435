//! Cohort metrics derived from position reconstruction.

use super::position::{reconstruct, reconstruct_by_pool, scan, PoolFilter, Totals};
use crate::domain::{ActionClass, ActionRecord, Decimal, Month, PoolName, WalletAddress};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Net-position size band. Labels sort lexicographically in band order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum StakeAmountBucket {
    Under10,
    From10To100,
    From100To1k,
    From1kTo10k,
    AtLeast10k,
}

impl StakeAmountBucket {
    pub const ALL: [StakeAmountBucket; 5] = [
        StakeAmountBucket::Under10,
        StakeAmountBucket::From10To100,
        StakeAmountBucket::From100To1k,
        StakeAmountBucket::From1kTo10k,
        StakeAmountBucket::AtLeast10k,
    ];

    /// `None` for negative amounts, which have no band.
    pub fn for_amount(amount: Decimal) -> Option<Self> {
        if amount.is_negative() {
            return None;
        }
        let bucket = if amount < Decimal::from_count(10) {
            StakeAmountBucket::Under10
        } else if amount < Decimal::from_count(100) {
            StakeAmountBucket::From10To100
        } else if amount < Decimal::from_count(1_000) {
            StakeAmountBucket::From100To1k
        } else if amount < Decimal::from_count(10_000) {
            StakeAmountBucket::From1kTo10k
        } else {
            StakeAmountBucket::AtLeast10k
        };
        Some(bucket)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StakeAmountBucket::Under10 => "a. < 10 SOL",
            StakeAmountBucket::From10To100 => "b. 10-100 SOL",
            StakeAmountBucket::From100To1k => "c. 100-1k SOL",
            StakeAmountBucket::From1kTo10k => "d. 1k-10k SOL",
            StakeAmountBucket::AtLeast10k => "e. >= 10k SOL",
        }
    }
}

/// Time since a wallet's first deposit. Labels sort lexicographically in band order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum StakeDurationBucket {
    UnderWeek,
    WeekToMonth,
    MonthToQuarter,
    QuarterToHalfYear,
    HalfYearToYear,
    AtLeastYear,
}

impl StakeDurationBucket {
    pub const ALL: [StakeDurationBucket; 6] = [
        StakeDurationBucket::UnderWeek,
        StakeDurationBucket::WeekToMonth,
        StakeDurationBucket::MonthToQuarter,
        StakeDurationBucket::QuarterToHalfYear,
        StakeDurationBucket::HalfYearToYear,
        StakeDurationBucket::AtLeastYear,
    ];

    /// Negative spans (clock skew) fall in the first band.
    pub fn for_days(days: i64) -> Self {
        match days {
            i64::MIN..=6 => StakeDurationBucket::UnderWeek,
            7..=29 => StakeDurationBucket::WeekToMonth,
            30..=89 => StakeDurationBucket::MonthToQuarter,
            90..=179 => StakeDurationBucket::QuarterToHalfYear,
            180..=359 => StakeDurationBucket::HalfYearToYear,
            _ => StakeDurationBucket::AtLeastYear,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StakeDurationBucket::UnderWeek => "a. < 7 days",
            StakeDurationBucket::WeekToMonth => "b. 7-30 days",
            StakeDurationBucket::MonthToQuarter => "c. 30-90 days",
            StakeDurationBucket::QuarterToHalfYear => "d. 90-180 days",
            StakeDurationBucket::HalfYearToYear => "e. 180-360 days",
            StakeDurationBucket::AtLeastYear => "f. >= 360 days",
        }
    }
}

/// A current staker with both classifications applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StakerProfile {
    pub wallet: WalletAddress,
    pub net_position: Decimal,
    pub staking_days: i64,
    pub amount_bucket: StakeAmountBucket,
    pub duration_bucket: StakeDurationBucket,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketCount {
    pub label: &'static str,
    pub wallets: usize,
    pub total_sol: Decimal,
}

/// Per-month cohort counts for one pool filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortSummaryRow {
    pub month: Month,
    pub new_stakers: usize,
    pub churned_stakers: usize,
    pub active_wallets: usize,
    pub stakers: usize,
}

/// Earliest deposit timestamp per wallet, considering months up to `up_to`.
fn first_deposits(
    actions: &[ActionRecord],
    up_to: Option<Month>,
    filter: &PoolFilter,
) -> BTreeMap<WalletAddress, DateTime<Utc>> {
    let (rows, _) = scan(actions, up_to, filter);
    let mut first: BTreeMap<WalletAddress, DateTime<Utc>> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.class == ActionClass::Deposit) {
        first
            .entry(row.record.wallet.clone())
            .and_modify(|t| *t = (*t).min(row.record.timestamp))
            .or_insert(row.record.timestamp);
    }
    first
}

/// Wallets whose earliest deposit falls in `month`.
///
/// This is first touch, not current status: the wallet may already have
/// withdrawn everything.
pub fn new_stakers(
    actions: &[ActionRecord],
    month: Month,
    filter: &PoolFilter,
) -> BTreeSet<WalletAddress> {
    first_deposits(actions, Some(month), filter)
        .into_iter()
        .filter(|(_, t)| Month::of(t.date_naive()) == month)
        .map(|(wallet, _)| wallet)
        .collect()
}

/// Count of first-time depositors per month.
pub fn new_stakers_by_month(actions: &[ActionRecord], filter: &PoolFilter) -> BTreeMap<Month, usize> {
    let mut counts = BTreeMap::new();
    for t in first_deposits(actions, None, filter).values() {
        *counts.entry(Month::of(t.date_naive())).or_insert(0) += 1;
    }
    counts
}

/// Wallets at or below zero as of `month` whose latest action is in `month`.
pub fn churned_stakers(
    actions: &[ActionRecord],
    month: Month,
    filter: &PoolFilter,
) -> BTreeSet<WalletAddress> {
    let (rows, _) = scan(actions, Some(month), filter);
    let mut state: BTreeMap<&WalletAddress, (Totals, Month)> = BTreeMap::new();
    for row in &rows {
        let entry = state
            .entry(&row.record.wallet)
            .or_insert((Totals::default(), row.month));
        entry.0.add(row.class, row.record.amount());
        entry.1 = entry.1.max(row.month);
    }
    state
        .into_iter()
        .filter(|(_, (totals, last))| !totals.net().is_positive() && *last == month)
        .map(|(wallet, _)| wallet.clone())
        .collect()
}

/// Distinct wallets with any counted action in `month`, regardless of position.
pub fn active_wallets(
    actions: &[ActionRecord],
    month: Month,
    filter: &PoolFilter,
) -> BTreeSet<WalletAddress> {
    let (rows, _) = scan(actions, Some(month), filter);
    rows.iter()
        .filter(|r| r.month == month)
        .map(|r| r.record.wallet.clone())
        .collect()
}

pub fn staker_count(actions: &[ActionRecord], month: Month, filter: &PoolFilter) -> usize {
    reconstruct(actions, month, filter).staker_count()
}

/// Staker count per month, recomputed from scratch for every month.
pub fn staker_count_series<I>(
    actions: &[ActionRecord],
    months: I,
    filter: &PoolFilter,
) -> BTreeMap<Month, usize>
where
    I: IntoIterator<Item = Month>,
{
    months
        .into_iter()
        .map(|m| (m, staker_count(actions, m, filter)))
        .collect()
}

/// Staker count per month for `from..=to` using running per-wallet sums.
/// Produces the same counts as [`staker_count_series`] in one pass.
pub fn staker_count_series_incremental(
    actions: &[ActionRecord],
    from: Month,
    to: Month,
    filter: &PoolFilter,
) -> BTreeMap<Month, usize> {
    let (rows, _) = scan(actions, Some(to), filter);

    let mut by_month: BTreeMap<Month, Vec<_>> = BTreeMap::new();
    for row in &rows {
        by_month.entry(row.month).or_default().push(row);
    }

    let mut net: BTreeMap<&WalletAddress, Totals> = BTreeMap::new();
    let mut staking = 0usize;
    let mut series = BTreeMap::new();
    let start = by_month.keys().next().map_or(from, |first| (*first).min(from));

    for month in Month::range_inclusive(start, to) {
        for row in by_month.get(&month).into_iter().flatten() {
            let totals = net.entry(&row.record.wallet).or_default();
            let was_staking = totals.net().is_positive();
            totals.add(row.class, row.record.amount());
            match (was_staking, totals.net().is_positive()) {
                (false, true) => staking += 1,
                (true, false) => staking -= 1,
                _ => {}
            }
        }
        if month >= from {
            series.insert(month, staking);
        }
    }
    series
}

/// Classify every current staker by amount and duration.
///
/// Duration runs from the wallet's first deposit to the earlier of the last
/// day of `month` and `now`.
pub fn staker_profiles(
    actions: &[ActionRecord],
    month: Month,
    filter: &PoolFilter,
    now: DateTime<Utc>,
) -> BTreeMap<WalletAddress, StakerProfile> {
    let positions = reconstruct(actions, month, filter);
    let first = first_deposits(actions, Some(month), filter);
    let reference = month.last_day().min(now.date_naive());

    positions
        .stakers()
        .filter_map(|p| {
            // Stakers have a positive net position, hence at least one deposit.
            let amount_bucket = StakeAmountBucket::for_amount(p.net_position)?;
            let staking_days = first
                .get(&p.wallet)
                .map_or(0, |t| (reference - t.date_naive()).num_days());
            Some((
                p.wallet.clone(),
                StakerProfile {
                    wallet: p.wallet.clone(),
                    net_position: p.net_position,
                    staking_days,
                    amount_bucket,
                    duration_bucket: StakeDurationBucket::for_days(staking_days),
                },
            ))
        })
        .collect()
}

/// Staker count and staked SOL per amount band, every band present.
pub fn amount_distribution(
    actions: &[ActionRecord],
    month: Month,
    filter: &PoolFilter,
    now: DateTime<Utc>,
) -> Vec<BucketCount> {
    let profiles = staker_profiles(actions, month, filter, now);
    StakeAmountBucket::ALL
        .iter()
        .map(|bucket| {
            let members = profiles.values().filter(|p| p.amount_bucket == *bucket);
            BucketCount {
                label: bucket.label(),
                wallets: members.clone().count(),
                total_sol: members.map(|p| p.net_position).sum(),
            }
        })
        .collect()
}

/// Staker count and staked SOL per duration band, every band present.
pub fn duration_distribution(
    actions: &[ActionRecord],
    month: Month,
    filter: &PoolFilter,
    now: DateTime<Utc>,
) -> Vec<BucketCount> {
    let profiles = staker_profiles(actions, month, filter, now);
    StakeDurationBucket::ALL
        .iter()
        .map(|bucket| {
            let members = profiles.values().filter(|p| p.duration_bucket == *bucket);
            BucketCount {
                label: bucket.label(),
                wallets: members.clone().count(),
                total_sol: members.map(|p| p.net_position).sum(),
            }
        })
        .collect()
}

/// Among wallets staking in `pool` as of `month`, how many also stake in each
/// other pool.
pub fn cross_pool_overlap(
    actions: &[ActionRecord],
    pool: &PoolName,
    month: Month,
) -> BTreeMap<PoolName, usize> {
    let positions = reconstruct_by_pool(actions, month, &PoolFilter::All);
    let in_pool: BTreeSet<&WalletAddress> = positions
        .stakers()
        .filter(|p| p.pool.as_ref() == Some(pool))
        .map(|p| &p.wallet)
        .collect();

    let mut overlap = BTreeMap::new();
    for ((wallet, other), position) in &positions.positions {
        if other != pool && position.is_staking && in_pool.contains(wallet) {
            *overlap.entry(other.clone()).or_insert(0) += 1;
        }
    }
    overlap
}

/// New, churned, active and staking counts for each month in `from..=to`.
pub fn cohort_summary(
    actions: &[ActionRecord],
    from: Month,
    to: Month,
    filter: &PoolFilter,
) -> Vec<CohortSummaryRow> {
    let new_by_month = new_stakers_by_month(actions, filter);
    let stakers = staker_count_series_incremental(actions, from, to, filter);

    Month::range_inclusive(from, to)
        .map(|month| CohortSummaryRow {
            month,
            new_stakers: new_by_month.get(&month).copied().unwrap_or(0),
            churned_stakers: churned_stakers(actions, month, filter).len(),
            active_wallets: active_wallets(actions, month, filter).len(),
            stakers: stakers.get(&month).copied().unwrap_or(0),
        })
        .collect()
}
