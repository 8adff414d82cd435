pub mod refresh;

pub use refresh::{DatasetHandle, RefreshError, RefreshOutcome, Refresher};
