// pylon: device management toolkit.
// The cache and refresh coordination that panels build on.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod refresh;
pub mod state;
pub mod ui;

pub use cache::{CacheKey, CacheStats, Entry, Store};
pub use config::CacheConfig;
pub use error::{PylonError, Result};
pub use refresh::{CacheEvent, LoadOutcome, RefreshCoordinator};
