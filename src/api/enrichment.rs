use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::params;
use super::AppState;
use crate::engine::{cross_tabulate, CrossTab, EnrichmentTable};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentQuery {
    pub month: Option<String>,
    pub pools: Option<String>,
}

/// Current stakers cross-tabulated against one enrichment table.
pub async fn get_enrichment(
    Path(table): Path<String>,
    Query(query): Query<EnrichmentQuery>,
    State(state): State<AppState>,
) -> Result<Json<CrossTab>, AppError> {
    let dataset = state.datasets().current();
    let table: &dyn EnrichmentTable = match table.as_str() {
        "holdings" => &dataset.holdings_table,
        "fund-sources" => &dataset.fund_source_table,
        "protocols" => &dataset.protocol_table,
        other => {
            return Err(AppError::NotFound(format!(
                "unknown enrichment table '{}'",
                other
            )))
        }
    };
    let month = params::month_or_latest(query.month.as_deref(), &dataset)?;
    let filter = params::pool_filter(query.pools.as_deref());

    let reconstruction = state
        .position_cache
        .get_or_compute(&dataset.actions, month, &filter);
    let stakers = reconstruction.stakers().map(|p| &p.wallet);

    Ok(Json(cross_tabulate(stakers, table, month)))
}
