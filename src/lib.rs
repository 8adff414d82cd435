pub mod api;
pub mod config;
pub mod dataset;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use dataset::{Dataset, RawSnapshot};
pub use datasource::{DataSource, DataSourceError, MockDataSource};
pub use db::{init_db, Repository};
pub use domain::{
    ActionKind, ActionLog, ActionRecord, Decimal, Month, PoolName, RawActionRow, WalletAddress,
};
pub use error::{AppError, DataIntegrityError};
