use anyhow::{Context, Result};
use stakescope::config::{Config, DataSourceConfig};
use stakescope::datasource::{AnalyticsApiSource, CsvDataSource};
use stakescope::orchestration::{DatasetHandle, Refresher};
use stakescope::{api, db::init_db, DataSource, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("failed to open snapshot store {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    let datasource: Arc<dyn DataSource> = match &config.data_source {
        DataSourceConfig::Csv { dir } => Arc::new(CsvDataSource::new(dir.clone())),
        DataSourceConfig::Analytics {
            api_url,
            api_key,
            queries,
        } => Arc::new(AnalyticsApiSource::new(
            api_url.clone(),
            api_key.clone(),
            queries.clone(),
        )),
    };

    let refresher = Arc::new(Refresher::new(
        datasource,
        repo,
        Arc::new(DatasetHandle::empty()),
    ));

    // Serve the last good snapshot until a refresh replaces it.
    if let Err(e) = refresher.load_persisted().await {
        tracing::warn!(error = %e, "persisted snapshot unusable, starting empty");
    }

    if config.refresh_on_start {
        let refresher = Arc::clone(&refresher);
        tokio::spawn(async move {
            // Failures are logged inside refresh().
            let _ = refresher.refresh().await;
        });
    }

    if config.refresh_interval_secs > 0 {
        Arc::clone(&refresher).spawn_periodic(Duration::from_secs(config.refresh_interval_secs));
    }

    let app = api::create_router(api::AppState::new(refresher));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
