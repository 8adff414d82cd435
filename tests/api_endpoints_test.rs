use axum::body::Body;
use axum::http::{Request, StatusCode};
use stakescope::api::{self, AppState};
use stakescope::datasource::MockDataSource;
use stakescope::db::init_db;
use stakescope::domain::{RawFundSourceRow, RawHoldingsRow};
use stakescope::engine::PositionCache;
use stakescope::orchestration::{DatasetHandle, Refresher};
use stakescope::{RawActionRow, Repository};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    mock: MockDataSource,
    cache: Arc<PositionCache>,
    _temp: TempDir,
}

fn action(tx: &str, date: &str, wallet: &str, pool: &str, kind: &str, sol: u64) -> RawActionRow {
    RawActionRow {
        transaction_id: tx.to_string(),
        timestamp: format!("{} 10:00:00.000", date),
        wallet_address: wallet.to_string(),
        pool_name: pool.to_string(),
        action: kind.to_string(),
        amount: (sol * 1_000_000_000).to_string(),
        succeeded: "true".to_string(),
    }
}

fn actions() -> Vec<RawActionRow> {
    vec![
        action("t1", "2022-01-05", "W1", "alpha", "deposit", 5),
        action("t2", "2022-02-05", "W1", "alpha", "withdraw", 2),
        action("t3", "2022-01-20", "W2", "BETA", "deposit", 300),
        action("t4", "2022-02-01", "W1", "beta", "deposit_stake", 12),
        action("t5", "2022-02-03", "W4", "alpha", "stake_boost_bonus", 99_999),
    ]
}

async fn setup_test_app(mock: MockDataSource) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");

    let refresher = Arc::new(Refresher::new(
        Arc::new(mock.clone()),
        Arc::new(Repository::new(pool)),
        Arc::new(DatasetHandle::empty()),
    ));
    let state = AppState::new(refresher);
    let cache = Arc::clone(&state.position_cache);
    let app = api::create_router(state);

    TestApp {
        app,
        mock,
        cache,
        _temp: temp_dir,
    }
}

async fn loaded_app() -> TestApp {
    let mock = MockDataSource::new()
        .with_actions(actions())
        .with_holdings(vec![RawHoldingsRow {
            wallet_address: "W1".to_string(),
            month: "2022-02".to_string(),
            sol_balance: "42".to_string(),
        }])
        .with_fund_sources(vec![RawFundSourceRow {
            wallet_address: "W2".to_string(),
            source: "coinbase".to_string(),
        }]);
    let test_app = setup_test_app(mock).await;
    let (status, _) = send(&test_app.app, "POST", "/v1/refresh").await;
    assert_eq!(status, StatusCode::OK);
    test_app
}

async fn send(app: &axum::Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_ready_before_and_after_refresh() {
    let test_app = setup_test_app(MockDataSource::new().with_actions(actions())).await;
    let (status, body) = send(&test_app.app, "GET", "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "loading");
    assert!(body["lastRun"].is_null());

    let (status, body) = send(&test_app.app, "POST", "/v1/refresh").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["actionRows"], 5);
    assert_eq!(body["unknownActions"], 1);

    let (status, body) = send(&test_app.app, "GET", "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["rows"]["actions"], 5);
    assert_eq!(body["lastRun"]["status"], "succeeded");
    assert_eq!(body["lastRun"]["actionRows"], 5);
}

#[tokio::test]
async fn test_pools_are_canonical_and_sorted() {
    let test_app = loaded_app().await;
    let (status, body) = send(&test_app.app, "GET", "/v1/pools").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pools"], serde_json::json!(["Alpha", "Beta"]));
}

#[tokio::test]
async fn test_positions_endpoint() {
    let test_app = loaded_app().await;
    let (status, body) = send(&test_app.app, "GET", "/v1/positions?month=2022-02&pools=alpha").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["month"], "2022-02");
    assert_eq!(body["stakerCount"], 1);
    assert_eq!(body["totalNetPosition"], "3");
    assert_eq!(body["diagnostics"]["excludedUnknownAction"], 1);

    let position = &body["positions"][0];
    assert_eq!(position["wallet"], "W1");
    assert_eq!(position["pool"], "Alpha");
    assert_eq!(position["depositTotal"], "5");
    assert_eq!(position["withdrawTotal"], "2");
    assert_eq!(position["netPosition"], "3");
    assert_eq!(position["isStaking"], true);

    let (_, body) = send(&test_app.app, "GET", "/v1/positions?month=2022-01").await;
    assert_eq!(body["stakerCount"], 2);
}

#[tokio::test]
async fn test_positions_rejects_bad_month() {
    let test_app = loaded_app().await;
    let (status, body) = send(&test_app.app, "GET", "/v1/positions?month=2022-1x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("month"));
}

#[tokio::test]
async fn test_actions_endpoint_filters_by_pool_and_date() {
    let test_app = loaded_app().await;
    let (status, body) = send(
        &test_app.app,
        "GET",
        "/v1/actions?pool=ALPHA&fromDate=2022-02-01&toDate=2022-02-28",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["transactionId"], "t2");
    assert_eq!(rows[0]["amount"], "2");
    assert_eq!(rows[0]["date"], "2022-02-05");
    assert_eq!(rows[0]["pool"], "Alpha");
    assert_eq!(rows[1]["transactionId"], "t5");
}

#[tokio::test]
async fn test_flows_endpoint() {
    let test_app = loaded_app().await;
    let (status, body) = send(&test_app.app, "GET", "/v1/flows?pools=alpha").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["month"], "2022-02");
    assert_eq!(rows[1]["netDeposit"], "-2");
    assert_eq!(rows[1]["cumulativeNetDeposit"], "3");
}

#[tokio::test]
async fn test_market_share_endpoint() {
    let test_app = loaded_app().await;
    let (status, body) = send(&test_app.app, "GET", "/v1/market-share?metric=netDeposit").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metric"], "netDeposit");
    assert_eq!(body["topPoolByMonth"]["2022-01"], "Beta");
    assert!(!body["rows"].as_array().unwrap().is_empty());

    let (status, _) = send(&test_app.app, "GET", "/v1/market-share?metric=vibes").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stakers_endpoint() {
    let test_app = loaded_app().await;
    let (status, body) = send(&test_app.app, "GET", "/v1/stakers?from=2022-01&to=2022-02").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["newStakers"], 2);
    assert_eq!(rows[0]["stakers"], 2);

    let (status, _) = send(&test_app.app, "GET", "/v1/stakers?from=2022-03&to=2022-01").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stakers_range_is_clamped_to_log_span() {
    let test_app = loaded_app().await;
    let (status, body) = send(&test_app.app, "GET", "/v1/stakers?from=1000-01&to=9999-12").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["month"], "2022-01");
    assert_eq!(rows[1]["month"], "2022-02");

    let (status, body) = send(&test_app.app, "GET", "/v1/stakers?from=2030-01&to=2030-06").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_junk_pool_filters_do_not_grow_position_cache() {
    let test_app = loaded_app().await;
    for i in 0..200 {
        let uri = format!("/v1/positions?month=2022-02&pools=junk{}", i);
        let (status, body) = send(&test_app.app, "GET", &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stakerCount"], 0);
    }
    assert_eq!(test_app.cache.len(), 1);
}

#[tokio::test]
async fn test_distribution_endpoints_cover_every_band() {
    let test_app = loaded_app().await;
    let (status, body) = send(&test_app.app, "GET", "/v1/distribution/amount?month=2022-02").await;
    assert_eq!(status, StatusCode::OK);
    let buckets = body["buckets"].as_array().unwrap();
    assert_eq!(buckets.len(), 5);
    let wallets: u64 = buckets.iter().map(|b| b["wallets"].as_u64().unwrap()).sum();
    assert_eq!(wallets, 2);

    let (_, body) = send(&test_app.app, "GET", "/v1/distribution/duration?month=2022-02").await;
    assert_eq!(body["buckets"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_overlap_endpoint() {
    let test_app = loaded_app().await;
    let (status, body) = send(&test_app.app, "GET", "/v1/overlap?month=2022-02&pool=alpha").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pool"], "Alpha");
    assert_eq!(body["overlap"][0]["pool"], "Beta");
    assert_eq!(body["overlap"][0]["sharedStakers"], 1);
}

#[tokio::test]
async fn test_enrichment_endpoints() {
    let test_app = loaded_app().await;
    let (status, body) = send(&test_app.app, "GET", "/v1/enrichment/holdings?month=2022-02").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["rows"][0]["category"], "c. 10-100 SOL");
    assert_eq!(body["rows"][1]["category"], "inactive / no data");

    let (_, body) = send(&test_app.app, "GET", "/v1/enrichment/fund-sources?month=2022-02").await;
    assert_eq!(body["rows"][0]["category"], "coinbase");

    let (_, body) = send(&test_app.app, "GET", "/v1/enrichment/protocols?month=2022-02").await;
    assert_eq!(body["rows"][0]["category"], "inactive / no data");
    assert_eq!(body["rows"][0]["stakers"], 2);

    let (status, _) = send(&test_app.app, "GET", "/v1/enrichment/weather").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_refresh_reports_data_load_failure_and_keeps_data() {
    let test_app = loaded_app().await;
    let (_, before) = send(&test_app.app, "GET", "/ready").await;

    let mut bad = actions();
    bad[0].amount = "five".to_string();
    test_app.mock.set_actions(bad);

    let (status, body) = send(&test_app.app, "POST", "/v1/refresh").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("data load failed"));

    let (status, after) = send(&test_app.app, "GET", "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after["version"], before["version"]);
    assert_eq!(after["lastRun"]["status"], "failed");
    assert!(after["lastRun"]["error"].as_str().unwrap().contains("amount"));
    let (_, body) = send(&test_app.app, "GET", "/v1/positions?month=2022-02&pools=alpha").await;
    assert_eq!(body["totalNetPosition"], "3");
}

#[tokio::test]
async fn test_concurrent_refresh_returns_conflict() {
    let mock = MockDataSource::new()
        .with_actions(actions())
        .with_delay(std::time::Duration::from_millis(300));
    let test_app = setup_test_app(mock).await;

    let background = {
        let app = test_app.app.clone();
        tokio::spawn(async move { send(&app, "POST", "/v1/refresh").await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let (status, _) = send(&test_app.app, "POST", "/v1/refresh").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = background.await.unwrap();
    assert_eq!(status, StatusCode::OK);
}
