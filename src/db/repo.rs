//! Repository layer for the persisted snapshot.
//!
//! The store holds exactly one snapshot: the last one that validated. A refresh
//! replaces it wholesale inside a single transaction, so readers of the file
//! never observe a half-written dataset.

use crate::dataset::{Dataset, RawSnapshot};
use crate::domain::{RawActionRow, RawFundSourceRow, RawHoldingsRow, RawProtocolInteractionRow};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::debug;

/// Metadata of the persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub version: String,
    pub refreshed_at: DateTime<Utc>,
}

/// Outcome of a refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "succeeded" => RunStatus::Succeeded,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Running,
        }
    }
}

/// One row of the refresh audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRun {
    pub id: i64,
    pub started_at_ms: i64,
    pub finished_at_ms: Option<i64>,
    pub status: RunStatus,
    pub action_rows: Option<i64>,
    pub error: Option<String>,
}

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // =========================================================================
    // Snapshot
    // =========================================================================

    /// Replace the persisted snapshot with `dataset`.
    ///
    /// # Errors
    /// Returns an error if any statement fails; the previous snapshot is then
    /// left untouched.
    pub async fn replace_snapshot(&self, dataset: &Dataset) -> Result<(), sqlx::Error> {
        let raw = dataset.to_raw();
        let mut tx = self.pool.begin().await?;

        for table in [
            "stake_pool_actions",
            "sol_holdings",
            "fund_sources",
            "protocol_interactions",
        ] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }

        for row in &raw.actions {
            sqlx::query(
                r#"
                INSERT INTO stake_pool_actions
                    (transaction_id, timestamp, wallet_address, pool_name, action, amount, succeeded)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.transaction_id)
            .bind(&row.timestamp)
            .bind(&row.wallet_address)
            .bind(&row.pool_name)
            .bind(&row.action)
            .bind(&row.amount)
            .bind(&row.succeeded)
            .execute(&mut *tx)
            .await?;
        }

        for row in &raw.holdings {
            sqlx::query(
                "INSERT INTO sol_holdings (wallet_address, month, sol_balance) VALUES (?, ?, ?)",
            )
            .bind(&row.wallet_address)
            .bind(&row.month)
            .bind(&row.sol_balance)
            .execute(&mut *tx)
            .await?;
        }

        for row in &raw.fund_sources {
            sqlx::query("INSERT INTO fund_sources (wallet_address, source) VALUES (?, ?)")
                .bind(&row.wallet_address)
                .bind(&row.source)
                .execute(&mut *tx)
                .await?;
        }

        for row in &raw.protocol_interactions {
            sqlx::query(
                r#"
                INSERT INTO protocol_interactions
                    (wallet_address, month, protocol, interaction_count)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&row.wallet_address)
            .bind(&row.month)
            .bind(&row.protocol)
            .bind(&row.interaction_count)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO snapshot_meta (id, version, refreshed_at_ms)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                refreshed_at_ms = excluded.refreshed_at_ms
            "#,
        )
        .bind(dataset.actions.version())
        .bind(dataset.refreshed_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            version = %dataset.actions.version(),
            actions = raw.actions.len(),
            "snapshot persisted"
        );
        Ok(())
    }

    /// Metadata of the persisted snapshot, if one was ever written.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn snapshot_meta(&self) -> Result<Option<SnapshotMeta>, sqlx::Error> {
        let row = sqlx::query("SELECT version, refreshed_at_ms FROM snapshot_meta WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| {
            let refreshed_at_ms: i64 = r.get("refreshed_at_ms");
            SnapshotMeta {
                version: r.get("version"),
                refreshed_at: Utc
                    .timestamp_millis_opt(refreshed_at_ms)
                    .single()
                    .unwrap_or_default(),
            }
        }))
    }

    /// Load the persisted snapshot rows. `None` when nothing was ever stored.
    ///
    /// # Errors
    /// Returns an error if any query fails.
    pub async fn load_snapshot(
        &self,
    ) -> Result<Option<(SnapshotMeta, RawSnapshot)>, sqlx::Error> {
        let Some(meta) = self.snapshot_meta().await? else {
            return Ok(None);
        };

        let actions = sqlx::query(
            r#"
            SELECT transaction_id, timestamp, wallet_address, pool_name, action, amount, succeeded
            FROM stake_pool_actions
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| RawActionRow {
            transaction_id: r.get("transaction_id"),
            timestamp: r.get("timestamp"),
            wallet_address: r.get("wallet_address"),
            pool_name: r.get("pool_name"),
            action: r.get("action"),
            amount: r.get("amount"),
            succeeded: r.get("succeeded"),
        })
        .collect();

        let holdings = sqlx::query("SELECT wallet_address, month, sol_balance FROM sol_holdings")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|r| RawHoldingsRow {
                wallet_address: r.get("wallet_address"),
                month: r.get("month"),
                sol_balance: r.get("sol_balance"),
            })
            .collect();

        let fund_sources = sqlx::query("SELECT wallet_address, source FROM fund_sources")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|r| RawFundSourceRow {
                wallet_address: r.get("wallet_address"),
                source: r.get("source"),
            })
            .collect();

        let protocol_interactions = sqlx::query(
            "SELECT wallet_address, month, protocol, interaction_count FROM protocol_interactions",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| RawProtocolInteractionRow {
            wallet_address: r.get("wallet_address"),
            month: r.get("month"),
            protocol: r.get("protocol"),
            interaction_count: r.get("interaction_count"),
        })
        .collect();

        Ok(Some((
            meta,
            RawSnapshot {
                actions,
                holdings,
                fund_sources,
                protocol_interactions,
            },
        )))
    }

    // =========================================================================
    // Refresh audit trail
    // =========================================================================

    /// Record the start of a refresh and return its run id.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn start_refresh_run(&self) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO refresh_runs (started_at_ms, status) VALUES (?, ?)")
            .bind(Utc::now().timestamp_millis())
            .bind(RunStatus::Running.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Close a refresh run with its outcome.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn finish_refresh_run(
        &self,
        id: i64,
        status: RunStatus,
        action_rows: Option<usize>,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE refresh_runs
            SET finished_at_ms = ?, status = ?, action_rows = ?, error = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().timestamp_millis())
        .bind(status.as_str())
        .bind(action_rows.map(|n| n as i64))
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent refresh runs, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn latest_refresh_runs(&self, limit: i64) -> Result<Vec<RefreshRun>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, started_at_ms, finished_at_ms, status, action_rows, error
            FROM refresh_runs
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| {
                let status: String = r.get("status");
                RefreshRun {
                    id: r.get("id"),
                    started_at_ms: r.get("started_at_ms"),
                    finished_at_ms: r.get("finished_at_ms"),
                    status: RunStatus::parse(&status),
                    action_rows: r.get("action_rows"),
                    error: r.get("error"),
                }
            })
            .collect())
    }
}
