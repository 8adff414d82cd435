use axum::extract::State;
use axum::Json;

use super::AppState;
use crate::error::AppError;
use crate::orchestration::RefreshOutcome;

/// Run a refresh now. 409 while another one is in flight.
pub async fn post_refresh(State(state): State<AppState>) -> Result<Json<RefreshOutcome>, AppError> {
    let outcome = state.refresher.refresh().await?;
    Ok(Json(outcome))
}
