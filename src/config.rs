// Cache configuration.
// Resolves the cache root and cleanup throttle from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::paths;
use crate::error::{PylonError, Result};

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "PYLON_CACHE_DIR";

/// Default minimum time between cleanup sweeps: 1 hour.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory holding every cache entry.
    pub root: PathBuf,
    /// Throttle for `cleanup_if_needed`.
    pub cleanup_interval: Duration,
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }

    /// Build a config from `PYLON_CACHE_DIR`, falling back to the platform
    /// cache directory.
    pub fn from_env() -> Result<Self> {
        Self::resolve(std::env::var_os(CACHE_DIR_ENV).map(PathBuf::from))
    }

    /// Build a config from an explicit root, falling back to the platform
    /// cache directory when `None`.
    pub fn resolve(root: Option<PathBuf>) -> Result<Self> {
        let root = match root.filter(|root| !root.as_os_str().is_empty()) {
            Some(root) => root,
            None => paths::cache_dir()
                .ok_or_else(|| PylonError::Other("could not determine cache directory".into()))?,
        };
        Ok(Self::new(root))
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
