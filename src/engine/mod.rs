//! Pure computation engine(s) for stake-pool cohort analytics.
//!
//! Every metric is recomputed from the immutable action log; nothing here
//! holds state across calls except the opt-in [`PositionCache`].

pub mod aggregate;
pub mod cache;
pub mod cohort;
pub mod enrichment;
pub mod position;

pub use aggregate::{
    cumulative_net_deposit_at, market_share, market_share_for, monthly_pool_aggregates,
    monthly_staker_counts, monthly_transaction_counts, monthly_unique_stakers, top_share_by_month,
    MarketShareRow, MonthlyPoolAggregate, MonthlyPoolValue, ShareMetric,
};
pub use cache::PositionCache;
pub use cohort::{
    active_wallets, amount_distribution, churned_stakers, cohort_summary, cross_pool_overlap,
    duration_distribution, new_stakers, new_stakers_by_month, staker_count, staker_count_series,
    staker_count_series_incremental, staker_profiles, BucketCount, CohortSummaryRow,
    StakeAmountBucket, StakeDurationBucket, StakerProfile,
};
pub use enrichment::{
    cross_tabulate, Category, CrossTab, CrossTabRow, EnrichmentTable, FundSourceTable,
    HoldingsBucket, HoldingsTable, ProtocolTable, NO_DATA_CATEGORY,
};
pub use position::{
    reconstruct, reconstruct_by_pool, PoolFilter, PoolReconstruction, ReconstructDiagnostics,
    Reconstruction, WalletPosition,
};
