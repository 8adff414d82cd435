//! Memoized reconstructions for one immutable action log.

use super::position::{reconstruct, PoolFilter, Reconstruction};
use crate::domain::{ActionLog, Month};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 256;

type Key = (Month, PoolFilter);

struct Entry {
    value: Arc<Reconstruction>,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    version: String,
    entries: HashMap<Key, Entry>,
    tick: u64,
}

impl CacheState {
    fn touch(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

/// Caches [`reconstruct`] results keyed by (log version, month, filter).
///
/// Entries from an older log version are dropped the first time a newer
/// version is requested, so the cache never serves results from a replaced log.
/// At most `capacity` entries are kept; the least recently used one goes first.
pub struct PositionCache {
    state: Mutex<CacheState>,
    capacity: usize,
}

impl Default for PositionCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl PositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn get_or_compute(
        &self,
        log: &ActionLog,
        as_of: Month,
        filter: &PoolFilter,
    ) -> Arc<Reconstruction> {
        let key = normalize(log, as_of, filter);
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.version != log.version() {
                debug!(
                    old = %state.version,
                    new = %log.version(),
                    "action log changed, clearing position cache"
                );
                state.version = log.version().to_string();
                state.entries.clear();
            } else {
                let tick = state.touch();
                if let Some(hit) = state.entries.get_mut(&key) {
                    hit.last_used = tick;
                    return Arc::clone(&hit.value);
                }
            }
        }

        // Computed outside the lock; a concurrent miss on the same key only
        // duplicates work, the results are identical.
        let computed = Arc::new(reconstruct(log.records(), key.0, &key.1));

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.version == log.version() {
            if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
                state.evict_least_recent();
            }
            let last_used = state.touch();
            state.entries.insert(
                key,
                Entry {
                    value: Arc::clone(&computed),
                    last_used,
                },
            );
        }
        computed
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Map a query onto the smallest key with the same reconstruction.
///
/// Pools absent from the log match no record, so they are dropped from the
/// filter. Months after the last active month see the same records as that
/// month, and months before the first one see none.
fn normalize(log: &ActionLog, as_of: Month, filter: &PoolFilter) -> Key {
    let filter = match filter {
        PoolFilter::All => PoolFilter::All,
        PoolFilter::Only(pools) => {
            PoolFilter::Only(pools.intersection(log.pools()).cloned().collect())
        }
    };
    let month = match log.month_span() {
        Some((_, last)) if as_of > last => last,
        Some((first, _)) if as_of < first => first.prev(),
        _ => as_of,
    };
    (month, filter)
}
