// Cleanup scheduler for the cache store.
// Sweeps expired entries, throttled by a persisted watermark.

use std::io;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::error::{PylonError, Result};

use super::entry::Meta;
use super::fs::FileSystem;
use super::paths;
use super::store::Store;

/// Temp files older than this are left over from a crashed write.
pub const ORPHANED_TEMP_AGE: Duration = Duration::from_secs(15 * 60);

impl<F: FileSystem> Store<F> {
    /// Remove every expired entry. Returns how many were removed.
    ///
    /// The first removal failure aborts the sweep; entries already removed
    /// stay removed.
    pub fn cleanup(&self) -> Result<usize> {
        let _guard = self.lock.write();
        self.sweep(Utc::now())
    }

    /// Run [`Store::cleanup`] unless the last recorded cleanup is more recent
    /// than `interval`, in which case nothing happens and 0 is returned.
    pub fn cleanup_if_needed(&self, interval: Duration) -> Result<usize> {
        let _guard = self.lock.write();
        let now = Utc::now();

        if let Some(meta) = self.load_meta() {
            if !interval_elapsed(meta.last_cleanup, now, interval) {
                debug!(last_cleanup = %meta.last_cleanup, "skipping cache cleanup");
                return Ok(0);
            }
        }

        let removed = self.sweep(now)?;

        // The sweep already happened; a lost watermark only means the next
        // cleanup runs early.
        if let Err(err) = self.store_meta(&Meta::new(now)) {
            warn!(error = %err, "failed to persist cache cleanup watermark");
        }

        Ok(removed)
    }

    /// Read the metadata record. Missing, corrupt, or outdated metadata all
    /// read as `None`.
    pub fn read_meta(&self) -> Option<Meta> {
        let _guard = self.lock.read();
        self.load_meta()
    }

    pub fn write_meta(&self, meta: &Meta) -> Result<()> {
        let _guard = self.lock.write();
        self.store_meta(meta)
    }

    fn load_meta(&self) -> Option<Meta> {
        let path = paths::meta_path(&self.root);
        let bytes = match self.fs.read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                debug!(error = %err, "unreadable cache metadata");
                return None;
            }
        };

        match Meta::from_bytes(&bytes) {
            Ok(meta) if meta.version == super::entry::CURRENT_VERSION => Some(meta),
            Ok(_) => None,
            Err(err) => {
                debug!(error = %err, "corrupt cache metadata");
                None
            }
        }
    }

    fn store_meta(&self, meta: &Meta) -> Result<()> {
        let bytes = meta.to_bytes()?;
        self.write_atomic(&paths::meta_path(&self.root), &bytes)
    }

    /// Caller holds the write lock.
    fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;

        for path in self.entry_files()? {
            // Unreadable entries are left for the self-healing read path
            let Some(entry) = self.read_entry_file(&path) else {
                continue;
            };
            if !entry.is_expired_at(now) {
                continue;
            }
            if self
                .remove_if_exists(&path)
                .map_err(|err| PylonError::io("remove", &path, err))?
            {
                removed += 1;
            }
        }

        let orphans = self.sweep_orphaned_temp_files(now);
        debug!(removed, orphans, "cache cleanup finished");
        Ok(removed)
    }

    /// Best-effort removal of temp files abandoned by a crashed write.
    fn sweep_orphaned_temp_files(&self, now: DateTime<Utc>) -> usize {
        let files = match self.fs.walk_files(&self.root) {
            Ok(files) => files,
            Err(err) => {
                warn!(error = %err, "failed to list cache for orphaned temp files");
                return 0;
            }
        };

        let mut removed = 0;
        for path in files.iter().filter(|path| paths::is_temp_file(path)) {
            let Some(modified) = self.fs.metadata(path).ok().and_then(|info| info.modified)
            else {
                continue;
            };
            let modified: DateTime<Utc> = modified.into();
            if !interval_elapsed(modified, now, ORPHANED_TEMP_AGE) {
                continue;
            }
            match self.remove_if_exists(path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove orphaned temp file")
                }
            }
        }
        removed
    }
}

/// Whether at least `interval` has passed between `since` and `now`.
/// A timestamp in the future counts as elapsed so a skewed clock cannot
/// block cleanup indefinitely.
fn interval_elapsed(since: DateTime<Utc>, now: DateTime<Utc>, interval: Duration) -> bool {
    let elapsed = now.signed_duration_since(since);
    if elapsed < TimeDelta::zero() {
        return true;
    }
    match elapsed.to_std() {
        Ok(elapsed) => elapsed >= interval,
        Err(_) => true,
    }
}
