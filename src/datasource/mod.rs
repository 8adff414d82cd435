//! Data source abstraction for the raw tables the dashboard is computed from.
//!
//! Sources return unvalidated rows; validation happens once, in the refresh
//! path, so every source gets the same integrity rules.

use crate::domain::{RawActionRow, RawFundSourceRow, RawHoldingsRow, RawProtocolInteractionRow};
use async_trait::async_trait;
use std::fmt;

pub mod analytics;
pub mod csv_files;
pub mod mock;

pub use analytics::{AnalyticsApiSource, QuerySet};
pub use csv_files::CsvDataSource;
pub use mock::MockDataSource;

/// Data source trait for fetching the action log and enrichment tables.
///
/// Each call returns a complete table; there are no incremental reads.
#[async_trait]
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Fetch every stake-pool action row.
    async fn fetch_actions(&self) -> Result<Vec<RawActionRow>, DataSourceError>;

    /// Fetch SOL holdings per wallet per month. Empty when unavailable.
    async fn fetch_holdings(&self) -> Result<Vec<RawHoldingsRow>, DataSourceError>;

    /// Fetch fund-source attribution per wallet. Empty when unavailable.
    async fn fetch_fund_sources(&self) -> Result<Vec<RawFundSourceRow>, DataSourceError>;

    /// Fetch protocol interaction counts per wallet per month. Empty when unavailable.
    async fn fetch_protocol_interactions(
        &self,
    ) -> Result<Vec<RawProtocolInteractionRow>, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON, CSV or malformed response)
    ParseError(String),
    /// Rate limit exceeded (caller should implement backoff)
    RateLimited,
    /// The remote query ran but failed or timed out
    QueryFailed(String),
    /// Local file could not be read
    Io(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::QueryFailed(msg) => write!(f, "Query failed: {}", msg),
            DataSourceError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}
