use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::params;
use super::AppState;
use crate::domain::PoolName;
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolsResponse {
    pub pools: Vec<PoolName>,
}

pub async fn get_pools(State(state): State<AppState>) -> Json<PoolsResponse> {
    let dataset = state.datasets().current();
    Json(PoolsResponse {
        pools: dataset.actions.pools().iter().cloned().collect(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionsQuery {
    pub pool: String,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDto {
    pub date: String,
    pub transaction_id: String,
    pub staker: String,
    pub action: String,
    pub amount: String,
    pub pool: String,
}

/// Successful actions for one pool, newest first.
pub async fn get_actions(
    Query(query): Query<ActionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ActionDto>>, AppError> {
    if query.pool.trim().is_empty() {
        return Err(AppError::BadRequest("pool is required".to_string()));
    }
    let pool = PoolName::canonical(&query.pool);
    let from = query
        .from_date
        .as_deref()
        .map(|d| params::date("fromDate", d))
        .transpose()?;
    let to = query
        .to_date
        .as_deref()
        .map(|d| params::date("toDate", d))
        .transpose()?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::BadRequest(
                "fromDate must be <= toDate".to_string(),
            ));
        }
    }

    let dataset = state.datasets().current();
    let actions = dataset
        .actions
        .records()
        .iter()
        .rev()
        .filter(|r| r.succeeded && r.pool == pool)
        .filter(|r| {
            let day = r.timestamp.date_naive();
            from.map_or(true, |f| day >= f) && to.map_or(true, |t| day <= t)
        })
        .map(|r| ActionDto {
            date: r.timestamp.date_naive().to_string(),
            transaction_id: r.transaction_id.clone(),
            staker: r.wallet.to_string(),
            action: r.action.to_string(),
            amount: r.amount().to_canonical_string(),
            pool: r.pool.to_string(),
        })
        .collect();

    Ok(Json(actions))
}
