//! Hosted SQL analytics API client.
//!
//! A query is submitted once, polled until it finishes, then read page by
//! page. Column labels become field names of the raw row types.

use super::{DataSource, DataSourceError};
use crate::domain::{RawActionRow, RawFundSourceRow, RawHoldingsRow, RawProtocolInteractionRow};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Default action-log query.
pub const ACTIONS_SQL: &str = "select tx_id, block_timestamp, address, stake_pool_name, action, \
amount, succeeded from solana.core.fact_stake_pool_actions";

/// Rows requested per results page.
const PAGE_SIZE: usize = 100_000;

/// Give up on a query that has not finished after this long.
const QUERY_TIMEOUT_SECS: u64 = 300;

const POLL_INTERVAL_SECS: u64 = 3;

/// SQL text per table. Enrichment tables without a query are empty.
#[derive(Debug, Clone)]
pub struct QuerySet {
    pub actions: String,
    pub holdings: Option<String>,
    pub fund_sources: Option<String>,
    pub protocol_interactions: Option<String>,
}

impl Default for QuerySet {
    fn default() -> Self {
        Self {
            actions: ACTIONS_SQL.to_string(),
            holdings: None,
            fund_sources: None,
            protocol_interactions: None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateQueryRequest<'a> {
    sql: &'a str,
    ttl_minutes: u32,
}

#[derive(Deserialize)]
struct CreateQueryResponse {
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResultsResponse {
    status: String,
    #[serde(default)]
    column_labels: Vec<String>,
    #[serde(default)]
    results: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnalyticsApiSource {
    client: Client,
    base_url: String,
    api_key: String,
    queries: QuerySet,
}

impl AnalyticsApiSource {
    pub fn new(base_url: String, api_key: String, queries: QuerySet) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            queries,
        }
    }

    /// Send with retry: transport errors, 429 and 5xx are retried with
    /// exponential backoff, other statuses fail immediately.
    async fn send_json<T: DeserializeOwned>(
        &self,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<T, DataSourceError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let build = &build;

        retry(backoff, || async {
            let response = build()
                .header("x-api-key", &self.api_key)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<T>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }

    async fn run_query<T: DeserializeOwned>(&self, sql: &str) -> Result<Vec<T>, DataSourceError> {
        let url = format!("{}/queries", self.base_url);
        let created: CreateQueryResponse = self
            .send_json(|| {
                self.client.post(&url).json(&CreateQueryRequest {
                    sql,
                    ttl_minutes: 15,
                })
            })
            .await?;
        debug!("Submitted query, token={}", created.token);

        let mut rows = Vec::new();
        let mut page = 1usize;
        loop {
            let results = self.wait_for_page(&created.token, page).await?;
            let received = results.results.len();
            for values in results.results {
                rows.push(row_from_values(&results.column_labels, values)?);
            }
            if received < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        info!("Query {} returned {} rows", created.token, rows.len());
        Ok(rows)
    }

    async fn wait_for_page(
        &self,
        token: &str,
        page: usize,
    ) -> Result<QueryResultsResponse, DataSourceError> {
        let url = format!(
            "{}/queries/{}?pageNumber={}&pageSize={}",
            self.base_url, token, page, PAGE_SIZE
        );
        let deadline = tokio::time::Instant::now() + Duration::from_secs(QUERY_TIMEOUT_SECS);

        loop {
            let response: QueryResultsResponse = self.send_json(|| self.client.get(&url)).await?;
            match response.status.to_ascii_lowercase().as_str() {
                "finished" => return Ok(response),
                "error" | "failed" | "cancelled" => {
                    return Err(DataSourceError::QueryFailed(
                        response
                            .error_message
                            .unwrap_or_else(|| format!("query {} failed", token)),
                    ));
                }
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DataSourceError::QueryFailed(format!(
                    "query {} did not finish within {}s",
                    token, QUERY_TIMEOUT_SECS
                )));
            }
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
        }
    }

    async fn run_optional<T: DeserializeOwned>(
        &self,
        sql: Option<&str>,
    ) -> Result<Vec<T>, DataSourceError> {
        match sql {
            Some(sql) => self.run_query(sql).await,
            None => Ok(Vec::new()),
        }
    }
}

/// Build a raw row from one result row. Values are stringified so that the
/// domain validators see the same shape as from CSV.
fn row_from_values<T: DeserializeOwned>(
    labels: &[String],
    values: Vec<serde_json::Value>,
) -> Result<T, DataSourceError> {
    let object: serde_json::Map<String, serde_json::Value> = labels
        .iter()
        .zip(values)
        .map(|(label, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (label.to_ascii_lowercase(), serde_json::Value::String(text))
        })
        .collect();
    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| DataSourceError::ParseError(e.to_string()))
}

#[async_trait]
impl DataSource for AnalyticsApiSource {
    async fn fetch_actions(&self) -> Result<Vec<RawActionRow>, DataSourceError> {
        self.run_query(&self.queries.actions).await
    }

    async fn fetch_holdings(&self) -> Result<Vec<RawHoldingsRow>, DataSourceError> {
        self.run_optional(self.queries.holdings.as_deref()).await
    }

    async fn fetch_fund_sources(&self) -> Result<Vec<RawFundSourceRow>, DataSourceError> {
        self.run_optional(self.queries.fund_sources.as_deref()).await
    }

    async fn fetch_protocol_interactions(
        &self,
    ) -> Result<Vec<RawProtocolInteractionRow>, DataSourceError> {
        self.run_optional(self.queries.protocol_interactions.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_from_values_stringifies_columns() {
        let labels = vec![
            "TX_ID".to_string(),
            "BLOCK_TIMESTAMP".to_string(),
            "ADDRESS".to_string(),
            "STAKE_POOL_NAME".to_string(),
            "ACTION".to_string(),
            "AMOUNT".to_string(),
            "SUCCEEDED".to_string(),
        ];
        let values = vec![
            json!("tx1"),
            json!("2022-01-05T10:00:00.000Z"),
            json!("W1"),
            json!("lido"),
            json!("deposit"),
            json!(5000000000u64),
            json!(true),
        ];
        let row: RawActionRow = row_from_values(&labels, values).unwrap();
        assert_eq!(row.transaction_id, "tx1");
        assert_eq!(row.amount, "5000000000");
        assert_eq!(row.succeeded, "true");
    }

    #[test]
    fn test_row_from_values_missing_column_fails() {
        let labels = vec!["ADDRESS".to_string()];
        let result: Result<RawFundSourceRow, _> = row_from_values(&labels, vec![json!("W1")]);
        assert!(matches!(result, Err(DataSourceError::ParseError(_))));
    }

    #[test]
    fn test_default_queries_only_cover_actions() {
        let queries = QuerySet::default();
        assert!(queries.actions.contains("fact_stake_pool_actions"));
        assert!(queries.holdings.is_none());
    }
}
