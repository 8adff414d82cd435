use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::params;
use super::AppState;
use crate::domain::{Decimal, Month};
use crate::engine::{ReconstructDiagnostics, WalletPosition};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsQuery {
    pub month: Option<String>,
    pub pools: Option<String>,
    /// Include wallets at or below zero. Defaults to false.
    pub include_exited: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsResponse {
    pub month: Month,
    pub staker_count: usize,
    pub total_net_position: Decimal,
    pub diagnostics: ReconstructDiagnostics,
    pub positions: Vec<WalletPosition>,
}

pub async fn get_positions(
    Query(query): Query<PositionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<PositionsResponse>, AppError> {
    let dataset = state.datasets().current();
    let month = params::month_or_latest(query.month.as_deref(), &dataset)?;
    let filter = params::pool_filter(query.pools.as_deref());

    let reconstruction = state
        .position_cache
        .get_or_compute(&dataset.actions, month, &filter);

    let include_exited = query.include_exited.unwrap_or(false);
    let positions = reconstruction
        .positions
        .values()
        .filter(|p| include_exited || p.is_staking)
        .cloned()
        .collect();

    Ok(Json(PositionsResponse {
        month,
        staker_count: reconstruction.staker_count(),
        total_net_position: reconstruction.total_net_position(),
        diagnostics: reconstruction.diagnostics,
        positions,
    }))
}
