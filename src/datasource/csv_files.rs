//! CSV cache directory as a data source.
//!
//! Layout: `actions.csv` (required), `holdings.csv`, `fund_sources.csv`,
//! `protocol_interactions.csv` (optional; a missing file is an empty table).

use super::{DataSource, DataSourceError};
use crate::domain::{RawActionRow, RawFundSourceRow, RawHoldingsRow, RawProtocolInteractionRow};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use tracing::{debug, info};

pub const ACTIONS_FILE: &str = "actions.csv";
pub const HOLDINGS_FILE: &str = "holdings.csv";
pub const FUND_SOURCES_FILE: &str = "fund_sources.csv";
pub const PROTOCOL_INTERACTIONS_FILE: &str = "protocol_interactions.csv";

#[derive(Debug, Clone)]
pub struct CsvDataSource {
    dir: PathBuf,
}

impl CsvDataSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read_table<T: DeserializeOwned>(
        &self,
        file: &str,
        required: bool,
    ) -> Result<Vec<T>, DataSourceError> {
        let path = self.dir.join(file);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                info!("{} not found, treating as empty", path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(DataSourceError::Io(format!("{}: {}", path.display(), e)));
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(bytes.as_slice());

        let rows = reader
            .deserialize()
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| DataSourceError::ParseError(format!("{}: {}", path.display(), e)))?;

        debug!("Read {} rows from {}", rows.len(), path.display());
        Ok(rows)
    }
}

#[async_trait]
impl DataSource for CsvDataSource {
    async fn fetch_actions(&self) -> Result<Vec<RawActionRow>, DataSourceError> {
        self.read_table(ACTIONS_FILE, true).await
    }

    async fn fetch_holdings(&self) -> Result<Vec<RawHoldingsRow>, DataSourceError> {
        self.read_table(HOLDINGS_FILE, false).await
    }

    async fn fetch_fund_sources(&self) -> Result<Vec<RawFundSourceRow>, DataSourceError> {
        self.read_table(FUND_SOURCES_FILE, false).await
    }

    async fn fetch_protocol_interactions(
        &self,
    ) -> Result<Vec<RawProtocolInteractionRow>, DataSourceError> {
        self.read_table(PROTOCOL_INTERACTIONS_FILE, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_actions_with_source_column_names() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(ACTIONS_FILE),
            "tx_id,block_timestamp,address,stake_pool_name,action,amount,succeeded\n\
             tx1,2022-01-05 10:00:00.000,W1,marinade,deposit,5000000000,TRUE\n",
        )
        .unwrap();

        let source = CsvDataSource::new(dir.path());
        let rows = source.fetch_actions().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].transaction_id, "tx1");
        assert_eq!(rows[0].pool_name, "marinade");
        assert_eq!(rows[0].amount, "5000000000");
    }

    #[tokio::test]
    async fn test_missing_optional_tables_are_empty() {
        let dir = TempDir::new().unwrap();
        let source = CsvDataSource::new(dir.path());
        assert!(source.fetch_holdings().await.unwrap().is_empty());
        assert!(source.fetch_fund_sources().await.unwrap().is_empty());
        assert!(source.fetch_protocol_interactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_actions_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let source = CsvDataSource::new(dir.path());
        match source.fetch_actions().await {
            Err(DataSourceError::Io(_)) => {}
            other => panic!("expected Io error, got {:?}", other),
        }
    }
}
