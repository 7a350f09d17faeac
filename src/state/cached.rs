// Consumer side of the stale-while-revalidate protocol.
// Tracks what a panel shows for one cache key and what it must do next.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::cache::{CacheKey, Entry};
use crate::refresh::CacheEvent;

use super::loading::LoadingState;

/// What a panel must do after applying a cache event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// The shown data is final for this cycle.
    Nothing,
    /// Nothing to show: fetch and wait for it.
    FetchNow,
    /// Stale data is shown: refresh it without blocking.
    RefreshInBackground,
}

/// Cached data as seen by one panel.
#[derive(Debug, Clone)]
pub struct CachedView<T> {
    pub key: CacheKey,
    pub data: LoadingState<T>,
    /// When the shown data was cached.
    pub cached_at: Option<DateTime<Utc>>,
    /// A background refresh is in flight.
    pub refreshing: bool,
    /// Last refresh failure, kept alongside still-visible stale data.
    pub last_error: Option<String>,
}

impl<T: DeserializeOwned> CachedView<T> {
    pub fn new(key: CacheKey) -> Self {
        Self {
            key,
            data: LoadingState::Idle,
            cached_at: None,
            refreshing: false,
            last_error: None,
        }
    }

    /// Whether the event belongs to this view.
    pub fn accepts(&self, event: &CacheEvent) -> bool {
        event.is_for(&self.key.device, &self.key.data_type)
    }

    /// Apply an event and return what the panel should do next. Events for
    /// other keys are ignored.
    pub fn apply(&mut self, event: &CacheEvent) -> NextStep {
        if !self.accepts(event) {
            return NextStep::Nothing;
        }

        match event {
            CacheEvent::Miss { .. } => {
                self.data = LoadingState::Loading;
                self.cached_at = None;
                NextStep::FetchNow
            }
            CacheEvent::Hit {
                entry,
                needs_refresh,
                ..
            } => {
                self.show(entry);
                if !self.data.is_loaded() {
                    // Cached data that no longer decodes is as good as nothing
                    self.data = LoadingState::Loading;
                    NextStep::FetchNow
                } else if *needs_refresh {
                    self.refreshing = true;
                    NextStep::RefreshInBackground
                } else {
                    NextStep::Nothing
                }
            }
            CacheEvent::RefreshComplete { result, .. } => {
                self.refreshing = false;
                match result {
                    Ok(entry) => self.show(entry),
                    Err(err) => self.fail(err.clone()),
                }
                NextStep::Nothing
            }
        }
    }

    /// Show a freshly fetched or cached entry.
    pub fn show(&mut self, entry: &Entry) {
        match entry.decode::<T>() {
            Ok(data) => {
                self.data = LoadingState::Loaded(data);
                self.cached_at = Some(entry.cached_at);
                self.last_error = None;
            }
            Err(err) => self.fail(err.to_string()),
        }
    }

    /// Record a failure. Data already on screen stays there.
    pub fn fail(&mut self, message: String) {
        if !self.data.is_loaded() {
            self.data = LoadingState::Error(message.clone());
        }
        self.last_error = Some(message);
    }

    /// Whether the view shows data that a refresh is replacing.
    pub fn is_stale(&self) -> bool {
        self.refreshing && self.data.is_loaded()
    }
}
