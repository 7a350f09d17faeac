// Stale-while-revalidate coordinator.
// Answers loads from the cache at once and runs refreshes as background tasks.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheKey, Entry, FileSystem, OsFs, Store};
use crate::error::{PylonError, Result};

use super::events::{CacheEvent, LoadOutcome};

/// Coordinates cache reads and refreshes for any number of consumers.
///
/// Results are delivered as [`CacheEvent`]s on the channel returned by
/// [`RefreshCoordinator::new`]. Clones share the store and the channel.
///
/// There is no de-duplication: two consumers refreshing the same key each
/// fetch, and the last write wins.
pub struct RefreshCoordinator<F = OsFs> {
    store: Arc<Store<F>>,
    events: mpsc::UnboundedSender<CacheEvent>,
}

impl<F> Clone for RefreshCoordinator<F> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            events: self.events.clone(),
        }
    }
}

impl<F: FileSystem + 'static> RefreshCoordinator<F> {
    pub fn new(store: Arc<Store<F>>) -> (Self, mpsc::UnboundedReceiver<CacheEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (Self { store, events }, receiver)
    }

    pub fn store(&self) -> &Arc<Store<F>> {
        &self.store
    }

    /// Look a key up, tolerating expiry: a hard-expired entry is still a hit,
    /// flagged as needing refresh. Store errors are logged and reported as a
    /// miss.
    pub async fn lookup(&self, key: &CacheKey) -> LoadOutcome {
        let store = Arc::clone(&self.store);
        let device = key.device.clone();
        let data_type = key.data_type.clone();

        let result =
            tokio::task::spawn_blocking(move || store.get_with_expired(&device, &data_type))
                .await
                .map_err(PylonError::from)
                .and_then(|result| result);

        match result {
            Ok(Some(entry)) => {
                let needs_refresh = entry.needs_refresh();
                debug!(
                    device = %key.device,
                    data_type = %key.data_type,
                    freshness = entry.freshness().display(),
                    "cache hit"
                );
                LoadOutcome::Hit {
                    entry,
                    needs_refresh,
                }
            }
            Ok(None) => LoadOutcome::Miss,
            Err(err) => {
                warn!(
                    device = %key.device,
                    data_type = %key.data_type,
                    error = %err,
                    "cache read failed, treating as miss"
                );
                LoadOutcome::Miss
            }
        }
    }

    /// Look a key up in the background and emit `Hit` or `Miss`.
    pub fn load(&self, key: CacheKey) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let outcome = this.lookup(&key).await;
            this.emit(CacheEvent::from_outcome(key, outcome));
        })
    }

    /// Fetch fresh data and write it to the cache, returning the new entry.
    ///
    /// This is the path for a miss, where there is nothing to show until the
    /// fetch finishes. If the fetch fails nothing is written.
    pub async fn fetch_and_cache<T, E, Fut, Fetch>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        fetch: Fetch,
    ) -> Result<Entry>
    where
        Fetch: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        T: Serialize,
        E: Display,
    {
        let payload = fetch()
            .await
            .map_err(|err| PylonError::Fetch(err.to_string()))?;
        let entry = Entry::new(key, &payload, ttl)?;

        let store = Arc::clone(&self.store);
        let written = entry.clone();
        tokio::task::spawn_blocking(move || store.put(&written)).await??;

        Ok(entry)
    }

    /// Refresh a key in the background and emit `RefreshComplete` when done.
    ///
    /// Every call spawns its own task. The task runs to completion and
    /// writes its result even if nobody is listening any more; cancellation
    /// belongs in `fetch` (e.g. a timeout).
    pub fn refresh<T, E, Fut, Fetch>(
        &self,
        key: CacheKey,
        ttl: Duration,
        fetch: Fetch,
    ) -> JoinHandle<()>
    where
        Fetch: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Serialize + Send + 'static,
        E: Display + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let result = this
                .fetch_and_cache(&key, ttl, fetch)
                .await
                .map_err(|err| err.to_string());

            if let Err(err) = &result {
                warn!(
                    device = %key.device,
                    data_type = %key.data_type,
                    error = %err,
                    "background refresh failed"
                );
            }

            this.emit(CacheEvent::RefreshComplete { key, result });
        })
    }

    /// Drop cached data after a write-through action so the next load misses.
    /// With no data type, every entry for the device is dropped. Failures are
    /// logged, not reported.
    pub fn invalidate(&self, device: impl Into<String>, data_type: Option<String>) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let device = device.into();

        tokio::task::spawn_blocking(move || {
            let result = match &data_type {
                Some(data_type) => store.invalidate(&device, data_type),
                None => store.invalidate_device(&device).map(|_| ()),
            };
            if let Err(err) = result {
                warn!(device = %device, data_type = ?data_type, error = %err, "cache invalidation failed");
            }
        })
    }

    fn emit(&self, event: CacheEvent) {
        if self.events.send(event).is_err() {
            debug!("no cache event receiver, dropping event");
        }
    }
}
