use crate::domain::{ActionClass, ActionRecord, Decimal, Month, PoolName, WalletAddress};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Which pools a computation is restricted to.
///
/// Matching is exact membership over canonical pool names, so "Jito" never
/// matches "Jitosol".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum PoolFilter {
    #[default]
    All,
    Only(BTreeSet<PoolName>),
}

impl PoolFilter {
    pub fn single(name: impl AsRef<str>) -> Self {
        PoolFilter::Only(BTreeSet::from([PoolName::canonical(name)]))
    }

    /// Restrict to an explicit candidate set. An empty set matches nothing.
    pub fn any_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        PoolFilter::Only(names.into_iter().map(PoolName::canonical).collect())
    }

    pub fn matches(&self, pool: &PoolName) -> bool {
        match self {
            PoolFilter::All => true,
            PoolFilter::Only(pools) => pools.contains(pool),
        }
    }

    /// The pool name when the filter selects exactly one pool.
    pub fn single_pool(&self) -> Option<&PoolName> {
        match self {
            PoolFilter::Only(pools) if pools.len() == 1 => pools.iter().next(),
            _ => None,
        }
    }
}

/// A wallet's reconstructed position as of a month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletPosition {
    pub wallet: WalletAddress,
    /// Set when the position is scoped to one pool.
    pub pool: Option<PoolName>,
    pub deposit_total: Decimal,
    pub withdraw_total: Decimal,
    pub net_position: Decimal,
    pub is_staking: bool,
}

/// Records dropped while scanning the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructDiagnostics {
    pub excluded_failed: usize,
    pub excluded_unknown_action: usize,
}

/// Output of [`reconstruct`]. Wallets that never had a counted action are
/// absent, never present with zero totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    pub positions: BTreeMap<WalletAddress, WalletPosition>,
    pub diagnostics: ReconstructDiagnostics,
}

impl Reconstruction {
    pub fn stakers(&self) -> impl Iterator<Item = &WalletPosition> {
        self.positions.values().filter(|p| p.is_staking)
    }

    pub fn staker_count(&self) -> usize {
        self.stakers().count()
    }

    pub fn total_net_position(&self) -> Decimal {
        self.positions.values().map(|p| p.net_position).sum()
    }
}

/// Output of [`reconstruct_by_pool`], keyed by (wallet, pool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReconstruction {
    pub positions: BTreeMap<(WalletAddress, PoolName), WalletPosition>,
    pub diagnostics: ReconstructDiagnostics,
}

impl PoolReconstruction {
    pub fn stakers(&self) -> impl Iterator<Item = &WalletPosition> {
        self.positions.values().filter(|p| p.is_staking)
    }
}

/// A counted record together with its class and month.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Classified<'a> {
    pub record: &'a ActionRecord,
    pub class: ActionClass,
    pub month: Month,
}

/// Apply the shared filtering steps: succeeded only, closed vocabulary,
/// month cutoff (inclusive) and pool filter.
pub(crate) fn scan<'a>(
    actions: &'a [ActionRecord],
    up_to: Option<Month>,
    filter: &PoolFilter,
) -> (Vec<Classified<'a>>, ReconstructDiagnostics) {
    let mut diagnostics = ReconstructDiagnostics::default();
    let mut rows = Vec::new();

    for record in actions {
        if !record.succeeded {
            diagnostics.excluded_failed += 1;
            continue;
        }
        let Some(class) = record.class() else {
            diagnostics.excluded_unknown_action += 1;
            continue;
        };
        let month = record.month();
        if up_to.is_some_and(|cutoff| month > cutoff) {
            continue;
        }
        if !filter.matches(&record.pool) {
            continue;
        }
        rows.push(Classified {
            record,
            class,
            month,
        });
    }

    (rows, diagnostics)
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Totals {
    pub deposit: Decimal,
    pub withdraw: Decimal,
}

impl Totals {
    pub fn add(&mut self, class: ActionClass, amount: Decimal) {
        match class {
            ActionClass::Deposit => self.deposit += amount,
            ActionClass::Withdraw => self.withdraw += amount,
        }
    }

    pub fn net(&self) -> Decimal {
        self.deposit - self.withdraw
    }

    fn into_position(self, wallet: WalletAddress, pool: Option<PoolName>) -> WalletPosition {
        let net_position = self.net();
        WalletPosition {
            wallet,
            pool,
            deposit_total: self.deposit,
            withdraw_total: self.withdraw,
            net_position,
            is_staking: net_position.is_positive(),
        }
    }
}

/// Reconstruct each wallet's net position from every counted action up to and
/// including `as_of`.
pub fn reconstruct(actions: &[ActionRecord], as_of: Month, filter: &PoolFilter) -> Reconstruction {
    let (rows, diagnostics) = scan(actions, Some(as_of), filter);

    let mut totals: BTreeMap<WalletAddress, Totals> = BTreeMap::new();
    for row in &rows {
        totals
            .entry(row.record.wallet.clone())
            .or_default()
            .add(row.class, row.record.amount());
    }

    let pool = filter.single_pool().cloned();
    let positions = totals
        .into_iter()
        .map(|(wallet, t)| (wallet.clone(), t.into_position(wallet, pool.clone())))
        .collect::<BTreeMap<_, _>>();

    debug!(
        as_of = %as_of,
        wallets = positions.len(),
        excluded_unknown_action = diagnostics.excluded_unknown_action,
        "reconstructed positions"
    );

    Reconstruction {
        positions,
        diagnostics,
    }
}

/// Like [`reconstruct`] but keeps each (wallet, pool) pair separate.
pub fn reconstruct_by_pool(
    actions: &[ActionRecord],
    as_of: Month,
    filter: &PoolFilter,
) -> PoolReconstruction {
    let (rows, diagnostics) = scan(actions, Some(as_of), filter);

    let mut totals: BTreeMap<(WalletAddress, PoolName), Totals> = BTreeMap::new();
    for row in &rows {
        totals
            .entry((row.record.wallet.clone(), row.record.pool.clone()))
            .or_default()
            .add(row.class, row.record.amount());
    }

    let positions = totals
        .into_iter()
        .map(|((wallet, pool), t)| {
            let position = t.into_position(wallet.clone(), Some(pool.clone()));
            ((wallet, pool), position)
        })
        .collect();

    PoolReconstruction {
        positions,
        diagnostics,
    }
}
