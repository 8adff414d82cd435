//! Dataset refresh: fetch, validate, persist, then swap.
//!
//! Readers hold an `Arc<Dataset>` for the duration of a request and never see
//! a partially replaced dataset. A failed refresh changes nothing: the
//! previous dataset stays authoritative both in memory and on disk.

use crate::dataset::{Dataset, RawSnapshot};
use crate::datasource::{DataSource, DataSourceError};
use crate::db::{RefreshRun, Repository, RunStatus};
use crate::error::DataIntegrityError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The currently served dataset.
#[derive(Debug)]
pub struct DatasetHandle {
    current: RwLock<Arc<Dataset>>,
    loaded: AtomicBool,
}

impl DatasetHandle {
    /// A handle serving the empty dataset until the first load.
    pub fn empty() -> Self {
        Self {
            current: RwLock::new(Arc::new(Dataset::empty())),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn new(dataset: Dataset) -> Self {
        Self {
            current: RwLock::new(Arc::new(dataset)),
            loaded: AtomicBool::new(true),
        }
    }

    pub fn current(&self) -> Arc<Dataset> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Whether a dataset has ever been installed.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn replace(&self, dataset: Dataset) -> Arc<Dataset> {
        let next = Arc::new(dataset);
        {
            let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
            *guard = Arc::clone(&next);
        }
        self.loaded.store(true, Ordering::Release);
        next
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("a refresh is already running")]
    AlreadyRunning,
    #[error("data source: {0}")]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Integrity(#[from] DataIntegrityError),
    #[error("snapshot store: {0}")]
    Store(#[from] sqlx::Error),
}

/// Summary of a successful refresh or load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub version: String,
    pub action_rows: usize,
    pub unknown_actions: usize,
    pub refreshed_at: DateTime<Utc>,
}

impl RefreshOutcome {
    fn of(dataset: &Dataset) -> Self {
        Self {
            version: dataset.actions.version().to_string(),
            action_rows: dataset.actions.len(),
            unknown_actions: dataset.unknown_actions().values().sum(),
            refreshed_at: dataset.refreshed_at,
        }
    }
}

/// Runs refreshes against one data source. At most one refresh is in flight.
pub struct Refresher {
    datasource: Arc<dyn DataSource>,
    repo: Arc<Repository>,
    handle: Arc<DatasetHandle>,
    in_flight: tokio::sync::Mutex<()>,
}

impl Refresher {
    pub fn new(
        datasource: Arc<dyn DataSource>,
        repo: Arc<Repository>,
        handle: Arc<DatasetHandle>,
    ) -> Self {
        Self {
            datasource,
            repo,
            handle,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn handle(&self) -> &Arc<DatasetHandle> {
        &self.handle
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// The most recent refresh attempts, newest first.
    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<RefreshRun>, RefreshError> {
        Ok(self.repo.latest_refresh_runs(limit).await?)
    }

    /// Install the last persisted snapshot, if any.
    ///
    /// # Errors
    /// A persisted snapshot that no longer validates is reported as
    /// [`RefreshError::Integrity`] and nothing is installed.
    pub async fn load_persisted(&self) -> Result<Option<RefreshOutcome>, RefreshError> {
        let Some((meta, raw)) = self.repo.load_snapshot().await? else {
            debug!("no persisted snapshot");
            return Ok(None);
        };
        let dataset = Dataset::from_raw(&raw, meta.refreshed_at)?;
        if dataset.actions.version() != meta.version {
            warn!(
                stored = %meta.version,
                computed = %dataset.actions.version(),
                "persisted snapshot version mismatch"
            );
        }
        let outcome = RefreshOutcome::of(&dataset);
        self.handle.replace(dataset);
        info!(
            version = %outcome.version,
            actions = outcome.action_rows,
            "loaded persisted snapshot"
        );
        Ok(Some(outcome))
    }

    /// Fetch every table, validate, persist and swap.
    ///
    /// # Errors
    /// [`RefreshError::AlreadyRunning`] if another refresh holds the slot.
    /// Any other error leaves the served dataset untouched.
    pub async fn refresh(&self) -> Result<RefreshOutcome, RefreshError> {
        let _slot = self
            .in_flight
            .try_lock()
            .map_err(|_| RefreshError::AlreadyRunning)?;

        let run_id = self.repo.start_refresh_run().await?;
        let result = self.run().await;

        let finished = match &result {
            Ok(outcome) => {
                self.repo
                    .finish_refresh_run(run_id, RunStatus::Succeeded, Some(outcome.action_rows), None)
                    .await
            }
            Err(e) => {
                error!(error = %e, "refresh failed, keeping previous dataset");
                self.repo
                    .finish_refresh_run(run_id, RunStatus::Failed, None, Some(&e.to_string()))
                    .await
            }
        };
        if let Err(e) = finished {
            warn!(run_id, error = %e, "could not record refresh outcome");
        }

        result
    }

    async fn run(&self) -> Result<RefreshOutcome, RefreshError> {
        let raw = self.fetch().await?;
        let dataset = Dataset::from_raw(&raw, Utc::now())?;

        for (name, count) in dataset.unknown_actions() {
            warn!(action = %name, count, "unrecognized action excluded from positions");
        }

        self.repo.replace_snapshot(&dataset).await?;
        let outcome = RefreshOutcome::of(&dataset);
        self.handle.replace(dataset);

        info!(
            version = %outcome.version,
            actions = outcome.action_rows,
            unknown = outcome.unknown_actions,
            "refresh complete"
        );
        Ok(outcome)
    }

    async fn fetch(&self) -> Result<RawSnapshot, DataSourceError> {
        let (actions, holdings, fund_sources, protocol_interactions) = futures::try_join!(
            self.datasource.fetch_actions(),
            self.datasource.fetch_holdings(),
            self.datasource.fetch_fund_sources(),
            self.datasource.fetch_protocol_interactions(),
        )?;
        debug!(
            actions = actions.len(),
            holdings = holdings.len(),
            fund_sources = fund_sources.len(),
            protocol_interactions = protocol_interactions.len(),
            "fetched raw tables"
        );
        Ok(RawSnapshot {
            actions,
            holdings,
            fund_sources,
            protocol_interactions,
        })
    }

    /// Refresh every `period`, starting one period from now.
    pub fn spawn_periodic(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.refresh().await {
                    Ok(_) => {}
                    Err(RefreshError::AlreadyRunning) => {
                        debug!("scheduled refresh skipped, one is already running")
                    }
                    // Already logged by refresh().
                    Err(_) => {}
                }
            }
        })
    }
}
