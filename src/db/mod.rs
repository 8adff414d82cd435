//! SQLite snapshot store.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - The last validated snapshot and the refresh audit trail

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{RefreshRun, Repository, RunStatus, SnapshotMeta};
