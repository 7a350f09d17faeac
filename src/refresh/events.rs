// Messages exchanged between the refresh coordinator and its consumers.

use crate::cache::{CacheKey, Entry};

/// Result of looking up a key in the cache.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// Nothing usable is cached.
    Miss,
    /// An entry exists, possibly already expired.
    Hit { entry: Entry, needs_refresh: bool },
}

impl LoadOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, LoadOutcome::Hit { .. })
    }
}

/// Event delivered to consumers over the coordinator's channel.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// Cached data is available. When `needs_refresh` is set the consumer
    /// should render it and start a background refresh.
    Hit {
        key: CacheKey,
        entry: Entry,
        needs_refresh: bool,
    },
    /// Nothing cached; the consumer must fetch.
    Miss { key: CacheKey },
    /// A background refresh finished. On success the new entry is already
    /// written to the cache.
    RefreshComplete {
        key: CacheKey,
        result: Result<Entry, String>,
    },
}

impl CacheEvent {
    pub fn from_outcome(key: CacheKey, outcome: LoadOutcome) -> Self {
        match outcome {
            LoadOutcome::Miss => CacheEvent::Miss { key },
            LoadOutcome::Hit {
                entry,
                needs_refresh,
            } => CacheEvent::Hit {
                key,
                entry,
                needs_refresh,
            },
        }
    }

    pub fn key(&self) -> &CacheKey {
        match self {
            CacheEvent::Hit { key, .. }
            | CacheEvent::Miss { key }
            | CacheEvent::RefreshComplete { key, .. } => key,
        }
    }

    /// Whether this event is about the given device and data type.
    pub fn is_for(&self, device: &str, data_type: &str) -> bool {
        let key = self.key();
        key.device == device && key.data_type == data_type
    }
}
