use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::params;
use super::AppState;
use crate::domain::{Month, PoolName};
use crate::engine::{
    market_share_for, monthly_pool_aggregates, top_share_by_month, MarketShareRow,
    MonthlyPoolAggregate, ShareMetric,
};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowsQuery {
    pub pools: Option<String>,
}

pub async fn get_flows(
    Query(query): Query<FlowsQuery>,
    State(state): State<AppState>,
) -> Json<Vec<MonthlyPoolAggregate>> {
    let dataset = state.datasets().current();
    let filter = params::pool_filter(query.pools.as_deref());
    Json(monthly_pool_aggregates(dataset.actions.records(), &filter))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketShareQuery {
    pub metric: Option<String>,
    pub pools: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketShareResponse {
    pub metric: ShareMetric,
    pub rows: Vec<MarketShareRow>,
    pub top_pool_by_month: BTreeMap<Month, PoolName>,
}

pub async fn get_market_share(
    Query(query): Query<MarketShareQuery>,
    State(state): State<AppState>,
) -> Result<Json<MarketShareResponse>, AppError> {
    let metric = match query.metric.as_deref() {
        None => ShareMetric::NetDeposit,
        Some(raw) => ShareMetric::from_str(raw).map_err(|_| {
            AppError::BadRequest(
                "metric must be one of: netDeposit, transactionCount, stakerCount".to_string(),
            )
        })?,
    };
    let filter = params::pool_filter(query.pools.as_deref());

    let dataset = state.datasets().current();
    let rows = market_share_for(dataset.actions.records(), metric, &filter);
    let top_pool_by_month = top_share_by_month(&rows);

    Ok(Json(MarketShareResponse {
        metric,
        rows,
        top_pool_by_month,
    }))
}
