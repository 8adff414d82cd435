use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::api::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// Ready once a dataset has been installed, from the store or a refresh.
///
/// `lastRun` is the latest refresh attempt, which may have failed while an
/// older dataset is still being served.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let last_run = match state.refresher.recent_runs(1).await {
        Ok(runs) => runs.into_iter().next(),
        Err(e) => {
            warn!(error = %e, "could not read refresh runs");
            None
        }
    };

    let handle = state.refresher.handle();
    if !handle.is_loaded() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "loading",
                "refreshing": state.refresher.is_running(),
                "lastRun": last_run,
            })),
        );
    }

    let dataset = handle.current();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "version": dataset.actions.version(),
            "refreshedAt": dataset.refreshed_at,
            "refreshing": state.refresher.is_running(),
            "lastRun": last_run,
            "rows": {
                "actions": dataset.actions.len(),
                "holdings": dataset.holdings.len(),
                "fundSources": dataset.fund_sources.len(),
                "protocolInteractions": dataset.protocol_interactions.len(),
            },
        })),
    )
}
