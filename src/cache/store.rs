// Cache store for reading and writing cached entries.
// Handles key derivation, atomic writes, self-healing reads, and invalidation.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{PylonError, Result};

use super::entry::{CacheKey, Entry};
use super::fs::{FileSystem, OsFs};
use super::paths;

/// File-backed cache of device data keyed by (device, data type).
///
/// The filesystem is the only source of truth: there is no in-memory index,
/// and every call goes back to disk. A single reader/writer lock serializes
/// mutations against reads and enumeration.
pub struct Store<F = OsFs> {
    pub(super) fs: F,
    pub(super) root: PathBuf,
    pub(super) lock: RwLock<()>,
}

/// Outcome of reading one entry file.
enum Loaded {
    Missing,
    Valid(Entry),
    /// Undecodable or written under another format version.
    Invalid(String),
}

impl Store<OsFs> {
    /// Open a store on the real disk rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::new(OsFs, root)
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::open(config.root.clone())
    }
}

impl<F: FileSystem> Store<F> {
    pub fn new(fs: F, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Path of the entry file for a key.
    pub fn entry_path(&self, device: &str, data_type: &str) -> PathBuf {
        paths::entry_path(&self.root, device, data_type)
    }

    /// Read a live entry. Expired entries are reported as missing but left
    /// on disk for [`Store::get_with_expired`].
    pub fn get(&self, device: &str, data_type: &str) -> Result<Option<Entry>> {
        Ok(self
            .get_with_expired(device, data_type)?
            .filter(|entry| !entry.is_expired()))
    }

    /// Read an entry regardless of expiry, for showing old data while a
    /// refresh runs.
    pub fn get_with_expired(&self, device: &str, data_type: &str) -> Result<Option<Entry>> {
        let path = self.entry_path(device, data_type);

        let loaded = {
            let _guard = self.lock.read();
            self.load(&path)?
        };

        match loaded {
            Loaded::Missing => Ok(None),
            Loaded::Valid(entry) => Ok(Some(entry)),
            Loaded::Invalid(reason) => {
                self.evict_invalid(&path, &reason);
                Ok(None)
            }
        }
    }

    /// Cache `payload` for `ttl`, replacing any existing entry.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        device: &str,
        data_type: &str,
        payload: &T,
        ttl: Duration,
    ) -> Result<()> {
        self.put(&Entry::new(&CacheKey::new(device, data_type), payload, ttl)?)
    }

    /// Like [`Store::set`], also recording the device's stable identifier.
    pub fn set_with_id<T: Serialize + ?Sized>(
        &self,
        device: &str,
        device_id: &str,
        data_type: &str,
        payload: &T,
        ttl: Duration,
    ) -> Result<()> {
        let key = CacheKey::new(device, data_type).with_device_id(device_id);
        self.put(&Entry::new(&key, payload, ttl)?)
    }

    /// Write an already-built entry.
    pub fn put(&self, entry: &Entry) -> Result<()> {
        let bytes = entry.to_bytes()?;
        let path = self.entry_path(&entry.device, &entry.data_type);

        let _guard = self.lock.write();
        self.write_atomic(&path, &bytes)
    }

    /// Delete one entry. Deleting an absent entry succeeds.
    pub fn invalidate(&self, device: &str, data_type: &str) -> Result<()> {
        let path = self.entry_path(device, data_type);

        let _guard = self.lock.write();
        self.remove_if_exists(&path)
            .map(|_| ())
            .map_err(|err| PylonError::io("remove", &path, err))
    }

    /// Delete every entry whose recorded device matches `device`, across all
    /// data types. Returns the number of entries removed.
    ///
    /// Matching uses the decoded `device` field rather than the file name, so
    /// two devices that sanitize to the same name are told apart.
    pub fn invalidate_device(&self, device: &str) -> Result<usize> {
        let _guard = self.lock.write();

        let mut removed = 0;
        for path in self.entry_files()? {
            let Some(entry) = self.read_entry_file(&path) else {
                continue;
            };
            if entry.device != device {
                continue;
            }
            if self
                .remove_if_exists(&path)
                .map_err(|err| PylonError::io("remove", &path, err))?
            {
                removed += 1;
            }
        }

        debug!(device, removed, "invalidated device cache");
        Ok(removed)
    }

    /// Delete everything under the cache root, keeping the root itself.
    pub fn invalidate_all(&self) -> Result<()> {
        let _guard = self.lock.write();

        let children = match self.fs.read_dir(&self.root) {
            Ok(children) => children,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(PylonError::io("list", &self.root, err)),
        };

        for child in children {
            let result = match self.fs.metadata(&child) {
                Ok(info) if info.is_dir => self.fs.remove_dir_all(&child),
                Ok(_) => self.fs.remove_file(&child),
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(PylonError::io("remove", &child, err)),
            }
        }

        debug!(root = %self.root.display(), "invalidated entire cache");
        Ok(())
    }

    /// Read and validate an entry file. Caller holds the lock.
    fn load(&self, path: &Path) -> Result<Loaded> {
        let bytes = match self.fs.read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Loaded::Missing),
            Err(err) => return Err(PylonError::io("read", path, err)),
        };

        Ok(match Entry::from_bytes(&bytes) {
            Ok(entry) if entry.is_current() => Loaded::Valid(entry),
            Ok(entry) => Loaded::Invalid(format!("format version {}", entry.version)),
            Err(err) => Loaded::Invalid(err.to_string()),
        })
    }

    /// Best-effort removal of a corrupt or outdated entry file.
    ///
    /// The file is checked again under the write lock: a concurrent `set` may
    /// have replaced it since it was read.
    fn evict_invalid(&self, path: &Path, reason: &str) {
        let _guard = self.lock.write();

        if !matches!(self.load(path), Ok(Loaded::Invalid(_))) {
            return;
        }

        match self.fs.remove_file(path) {
            Ok(()) => debug!(path = %path.display(), reason, "removed invalid cache entry"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %path.display(),
                reason,
                error = %err,
                "failed to remove invalid cache entry"
            ),
        }
    }

    /// Read and decode any entry file, ignoring failures. Caller holds the lock.
    pub(super) fn read_entry_file(&self, path: &Path) -> Option<Entry> {
        let bytes = self.fs.read(path).ok()?;
        Entry::from_bytes(&bytes).ok()
    }

    /// Every entry file under the root. Caller holds the lock.
    pub(super) fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let files = self
            .fs
            .walk_files(&self.root)
            .map_err(|err| PylonError::io("walk", &self.root, err))?;

        Ok(files
            .into_iter()
            .filter(|path| paths::is_entry_file(&self.root, path))
            .collect())
    }

    /// Write via `<path>.tmp` and rename, so readers never see a partial file.
    /// Caller holds the write lock.
    pub(super) fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.fs
                .create_dir_all(parent)
                .map_err(|err| PylonError::io("create directory", parent, err))?;
        }

        let temp_path = paths::temp_path(path);
        if let Err(err) = self.fs.write(&temp_path, bytes) {
            self.discard_temp(&temp_path);
            return Err(PylonError::io("write", &temp_path, err));
        }

        if let Err(err) = self.fs.rename(&temp_path, path) {
            self.discard_temp(&temp_path);
            return Err(PylonError::io("rename", path, err));
        }

        Ok(())
    }

    fn discard_temp(&self, temp_path: &Path) {
        if let Err(err) = self.remove_if_exists(temp_path) {
            warn!(path = %temp_path.display(), error = %err, "failed to remove temp file");
        }
    }

    /// Remove a file, treating "already gone" as success.
    /// Returns whether a file was actually removed.
    pub(super) fn remove_if_exists(&self, path: &Path) -> io::Result<bool> {
        match self.fs.remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::CURRENT_VERSION;
    use crate::cache::fs::MemFs;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Status {
        uptime: u64,
        firmware: String,
    }

    fn mem_store() -> Store<MemFs> {
        Store::new(MemFs::new(), "/cache")
    }

    #[test]
    fn test_set_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path());

        let status = Status {
            uptime: 1200,
            firmware: "2.4.1".to_string(),
        };
        store.set("router", "status", &status, HOUR).unwrap();

        let entry = store.get("router", "status").unwrap().unwrap();
        assert_eq!(entry.version, CURRENT_VERSION);
        assert!(!entry.is_expired());
        assert_eq!(entry.decode::<Status>().unwrap(), status);

        assert!(temp_dir.path().join("status/router.json").exists());
        assert!(!temp_dir.path().join("status/router.json.tmp").exists());
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = mem_store();
        assert!(store.get("router", "status").unwrap().is_none());
        assert!(store.get_with_expired("router", "status").unwrap().is_none());
    }

    #[test]
    fn test_set_replaces_entry() {
        let store = mem_store();
        store.set("router", "status", &json!({"a": 1, "b": 2}), HOUR).unwrap();
        store.set("router", "status", &json!({"a": 3}), HOUR).unwrap();

        let data: serde_json::Value = store.get("router", "status").unwrap().unwrap().decode().unwrap();
        assert_eq!(data, json!({"a": 3}));
    }

    #[test]
    fn test_set_with_id_records_device_id() {
        let store = mem_store();
        store
            .set_with_id("router", "serial-0042", "status", &1, HOUR)
            .unwrap();

        let entry = store.get("router", "status").unwrap().unwrap();
        assert_eq!(entry.device_id, "serial-0042");
    }

    #[test]
    fn test_expired_hidden_from_get_only() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path());

        store
            .set("router", "status", &"up", Duration::from_millis(1))
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert!(store.get("router", "status").unwrap().is_none());

        let stale = store.get_with_expired("router", "status").unwrap().unwrap();
        assert!(stale.is_expired());
        assert!(temp_dir.path().join("status/router.json").exists());
    }

    #[test]
    fn test_corrupt_file_is_removed_on_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path());
        let path = store.entry_path("router", "status");

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"this is not json").unwrap();

        assert!(store.get("router", "status").unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_version_mismatch_is_evicted() {
        for version in [0, CURRENT_VERSION + 1] {
            let store = mem_store();
            let path = store.entry_path("router", "status");
            let body = json!({
                "version": version,
                "device": "router",
                "data_type": "status",
                "cached_at": "2099-01-01T00:00:00Z",
                "expires_at": "2099-01-01T01:00:00Z",
                "data": {"uptime": 1}
            });

            store.fs().create_dir_all(path.parent().unwrap()).unwrap();
            store
                .fs()
                .write(&path, body.to_string().as_bytes())
                .unwrap();
            assert!(store.get_with_expired("router", "status").unwrap().is_none());
            assert!(!store.fs().exists(&path));

            store
                .fs()
                .write(&path, body.to_string().as_bytes())
                .unwrap();
            assert!(store.get("router", "status").unwrap().is_none());
            assert!(!store.fs().exists(&path));
        }
    }

    #[test]
    fn test_unencodable_payload_writes_nothing() {
        use std::collections::HashMap;

        let store = mem_store();
        let mut payload = HashMap::new();
        payload.insert((1, 2), "x");

        let err = store.set("router", "status", &payload, HOUR).unwrap_err();
        assert!(matches!(err, PylonError::Encode(_)));
        assert!(!store.fs().exists(Path::new("/cache/status")));
    }

    #[test]
    fn test_rename_failure_keeps_old_entry() {
        let store = mem_store();
        store.set("router", "status", &"old", HOUR).unwrap();

        store.fs().set_rename_failure(true);
        let err = store.set("router", "status", &"new", HOUR).unwrap_err();
        assert!(matches!(err, PylonError::Io { op: "rename", .. }));

        store.fs().set_rename_failure(false);
        let path = store.entry_path("router", "status");
        assert!(!store.fs().exists(&paths::temp_path(&path)));

        let value: String = store.get("router", "status").unwrap().unwrap().decode().unwrap();
        assert_eq!(value, "old");
    }

    #[test]
    fn test_read_error_is_surfaced() {
        let store = mem_store();
        // A directory where the entry file should be
        let path = store.entry_path("router", "status");
        store.fs().create_dir_all(&path).unwrap();

        let err = store.get("router", "status").unwrap_err();
        assert!(matches!(err, PylonError::Io { op: "read", .. }));
    }

    #[test]
    fn test_invalidate() {
        let store = mem_store();
        store.set("router", "status", &1, HOUR).unwrap();

        store.invalidate("router", "status").unwrap();
        assert!(store.get_with_expired("router", "status").unwrap().is_none());

        // Already absent
        store.invalidate("router", "status").unwrap();
    }

    #[test]
    fn test_invalidate_device_scoping() {
        let store = mem_store();
        store.set("d1", "status", &1, HOUR).unwrap();
        store.set("d1", "config/wifi", &2, HOUR).unwrap();
        store.set("d2", "status", &3, HOUR).unwrap();
        store.set("d2", "config/wifi", &4, HOUR).unwrap();

        assert_eq!(store.invalidate_device("d1").unwrap(), 2);

        assert!(store.get("d1", "status").unwrap().is_none());
        assert!(store.get("d1", "config/wifi").unwrap().is_none());
        assert!(store.get("d2", "status").unwrap().is_some());
        assert!(store.get("d2", "config/wifi").unwrap().is_some());
    }

    #[test]
    fn test_invalidate_device_uses_recorded_name() {
        let store = mem_store();
        // Both sanitize to "a_b"
        store.set("a/b", "status", &1, HOUR).unwrap();
        store.set("a_b", "config", &2, HOUR).unwrap();

        assert_eq!(store.invalidate_device("a/b").unwrap(), 1);
        assert!(store.get("a_b", "config").unwrap().is_some());
    }

    #[test]
    fn test_invalidate_all() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("cache");
        let store = Store::open(&root);

        // Missing root
        store.invalidate_all().unwrap();

        store.set("d1", "status", &1, HOUR).unwrap();
        store.set("d2", "config/wifi", &2, HOUR).unwrap();
        std::fs::write(root.join("meta.json"), b"{}").unwrap();

        store.invalidate_all().unwrap();

        assert!(root.exists());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }
}
