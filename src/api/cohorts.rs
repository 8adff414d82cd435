use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::params;
use super::AppState;
use crate::domain::{Month, PoolName};
use crate::engine::{
    amount_distribution, cohort_summary, cross_pool_overlap, duration_distribution, BucketCount,
    CohortSummaryRow,
};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakersQuery {
    pub pools: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// New, churned, active and staking counts per month.
pub async fn get_stakers(
    Query(query): Query<StakersQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<CohortSummaryRow>>, AppError> {
    let dataset = state.datasets().current();
    let filter = params::pool_filter(query.pools.as_deref());
    let Some((from, to)) =
        params::month_range(query.from.as_deref(), query.to.as_deref(), &dataset)?
    else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(cohort_summary(
        dataset.actions.records(),
        from,
        to,
        &filter,
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionQuery {
    pub month: Option<String>,
    pub pools: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionResponse {
    pub month: Month,
    pub buckets: Vec<BucketCount>,
}

pub async fn get_amount_distribution(
    Query(query): Query<DistributionQuery>,
    State(state): State<AppState>,
) -> Result<Json<DistributionResponse>, AppError> {
    let dataset = state.datasets().current();
    let month = params::month_or_latest(query.month.as_deref(), &dataset)?;
    let filter = params::pool_filter(query.pools.as_deref());
    Ok(Json(DistributionResponse {
        month,
        buckets: amount_distribution(dataset.actions.records(), month, &filter, Utc::now()),
    }))
}

pub async fn get_duration_distribution(
    Query(query): Query<DistributionQuery>,
    State(state): State<AppState>,
) -> Result<Json<DistributionResponse>, AppError> {
    let dataset = state.datasets().current();
    let month = params::month_or_latest(query.month.as_deref(), &dataset)?;
    let filter = params::pool_filter(query.pools.as_deref());
    Ok(Json(DistributionResponse {
        month,
        buckets: duration_distribution(dataset.actions.records(), month, &filter, Utc::now()),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapQuery {
    pub month: Option<String>,
    pub pool: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapRow {
    pub pool: PoolName,
    pub shared_stakers: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapResponse {
    pub month: Month,
    pub pool: PoolName,
    pub overlap: Vec<OverlapRow>,
}

/// Stakers of `pool` who also stake elsewhere, per other pool.
pub async fn get_overlap(
    Query(query): Query<OverlapQuery>,
    State(state): State<AppState>,
) -> Result<Json<OverlapResponse>, AppError> {
    if query.pool.trim().is_empty() {
        return Err(AppError::BadRequest("pool is required".to_string()));
    }
    let pool = PoolName::canonical(&query.pool);
    let dataset = state.datasets().current();
    let month = params::month_or_latest(query.month.as_deref(), &dataset)?;

    let mut overlap: Vec<OverlapRow> = cross_pool_overlap(dataset.actions.records(), &pool, month)
        .into_iter()
        .map(|(pool, shared_stakers)| OverlapRow {
            pool,
            shared_stakers,
        })
        .collect();
    overlap.sort_by(|a, b| {
        b.shared_stakers
            .cmp(&a.shared_stakers)
            .then_with(|| a.pool.cmp(&b.pool))
    });

    Ok(Json(OverlapResponse {
        month,
        pool,
        overlap,
    }))
}
