pub mod cohorts;
pub mod enrichment;
pub mod flows;
pub mod health;
pub mod params;
pub mod pools;
pub mod positions;
pub mod refresh;

use crate::engine::PositionCache;
use crate::orchestration::{DatasetHandle, Refresher};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub refresher: Arc<Refresher>,
    pub position_cache: Arc<PositionCache>,
}

impl AppState {
    pub fn new(refresher: Arc<Refresher>) -> Self {
        Self {
            refresher,
            position_cache: Arc::new(PositionCache::new()),
        }
    }

    pub fn datasets(&self) -> &Arc<DatasetHandle> {
        self.refresher.handle()
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/pools", get(pools::get_pools))
        .route("/v1/actions", get(pools::get_actions))
        .route("/v1/positions", get(positions::get_positions))
        .route("/v1/flows", get(flows::get_flows))
        .route("/v1/market-share", get(flows::get_market_share))
        .route("/v1/stakers", get(cohorts::get_stakers))
        .route(
            "/v1/distribution/amount",
            get(cohorts::get_amount_distribution),
        )
        .route(
            "/v1/distribution/duration",
            get(cohorts::get_duration_distribution),
        )
        .route("/v1/overlap", get(cohorts::get_overlap))
        .route("/v1/enrichment/:table", get(enrichment::get_enrichment))
        .route("/v1/refresh", post(refresh::post_refresh))
        .layer(cors)
        .with_state(state)
}
