//! Mock data source for testing without network calls.

use super::{DataSource, DataSourceError};
use crate::domain::{RawActionRow, RawFundSourceRow, RawHoldingsRow, RawProtocolInteractionRow};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Mock data source that returns predefined rows.
///
/// Clones share state, so a test can keep a handle and swap the rows or
/// inject a failure between refreshes.
#[derive(Debug, Clone, Default)]
pub struct MockDataSource {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    actions: Vec<RawActionRow>,
    holdings: Vec<RawHoldingsRow>,
    fund_sources: Vec<RawFundSourceRow>,
    protocol_interactions: Vec<RawProtocolInteractionRow>,
    failure: Option<DataSourceError>,
    delay: Option<std::time::Duration>,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_actions(self, rows: Vec<RawActionRow>) -> Self {
        self.state().actions.extend(rows);
        self
    }

    pub fn with_holdings(self, rows: Vec<RawHoldingsRow>) -> Self {
        self.state().holdings.extend(rows);
        self
    }

    pub fn with_fund_sources(self, rows: Vec<RawFundSourceRow>) -> Self {
        self.state().fund_sources.extend(rows);
        self
    }

    pub fn with_protocol_interactions(self, rows: Vec<RawProtocolInteractionRow>) -> Self {
        self.state().protocol_interactions.extend(rows);
        self
    }

    /// Delay every fetch, to hold a refresh in flight.
    pub fn with_delay(self, delay: std::time::Duration) -> Self {
        self.state().delay = Some(delay);
        self
    }

    /// Replace the action rows served from now on.
    pub fn set_actions(&self, rows: Vec<RawActionRow>) {
        self.state().actions = rows;
    }

    /// Make every fetch fail with `err` (or succeed again with `None`).
    pub fn set_failure(&self, err: Option<DataSourceError>) {
        self.state().failure = err;
    }

    async fn gate(&self) -> Result<(), DataSourceError> {
        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.state().failure.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn fetch_actions(&self) -> Result<Vec<RawActionRow>, DataSourceError> {
        self.gate().await?;
        Ok(self.state().actions.clone())
    }

    async fn fetch_holdings(&self) -> Result<Vec<RawHoldingsRow>, DataSourceError> {
        self.gate().await?;
        Ok(self.state().holdings.clone())
    }

    async fn fetch_fund_sources(&self) -> Result<Vec<RawFundSourceRow>, DataSourceError> {
        self.gate().await?;
        Ok(self.state().fund_sources.clone())
    }

    async fn fetch_protocol_interactions(
        &self,
    ) -> Result<Vec<RawProtocolInteractionRow>, DataSourceError> {
        self.gate().await?;
        Ok(self.state().protocol_interactions.clone())
    }
}
