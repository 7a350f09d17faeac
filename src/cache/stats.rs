// Cache statistics.
// Computed on demand by walking every entry file; nothing is kept in memory.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

use super::entry::Entry;
use super::fs::FileSystem;
use super::store::Store;

/// Snapshot of the cache contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    /// Sum of entry file sizes on disk.
    pub total_size: u64,
    pub expired_entries: usize,
    /// Number of distinct devices.
    pub devices: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub by_data_type: BTreeMap<String, usize>,
}

impl<F: FileSystem> Store<F> {
    /// Walk the cache and summarize it.
    ///
    /// Entries that cannot be stat'ed or decoded are skipped rather than
    /// failing the whole pass.
    pub fn stats(&self) -> Result<CacheStats> {
        let _guard = self.lock.read();
        let now = Utc::now();

        let mut stats = CacheStats::default();
        let mut devices = BTreeSet::new();

        for path in self.entry_files()? {
            let Ok(info) = self.fs.metadata(&path) else {
                continue;
            };
            let Some(entry) = self.read_entry_file(&path) else {
                continue;
            };

            stats.record(&entry, info.len, now);
            devices.insert(entry.device);
        }

        stats.devices = devices.len();
        Ok(stats)
    }
}

impl CacheStats {
    fn record(&mut self, entry: &Entry, size: u64, now: DateTime<Utc>) {
        self.total_entries += 1;
        self.total_size += size;
        if entry.is_expired_at(now) {
            self.expired_entries += 1;
        }
        *self
            .by_data_type
            .entry(entry.data_type.clone())
            .or_default() += 1;

        if self.oldest_entry.is_none_or(|oldest| entry.cached_at < oldest) {
            self.oldest_entry = Some(entry.cached_at);
        }
        if self.newest_entry.is_none_or(|newest| entry.cached_at > newest) {
            self.newest_entry = Some(entry.cached_at);
        }
    }

    /// Total size formatted for display (e.g. "1.5 KiB").
    pub fn size_display(&self) -> String {
        const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

        let mut size = self.total_size as f64;
        let mut unit = 0;
        while size >= 1024.0 && unit < UNITS.len() - 1 {
            size /= 1024.0;
            unit += 1;
        }

        if unit == 0 {
            format!("{} B", self.total_size)
        } else {
            format!("{:.1} {}", size, UNITS[unit])
        }
    }
}
