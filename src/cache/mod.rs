// Cache module for local filesystem caching.
// Stores device data per (device, data type) with TTLs, atomic writes, and
// self-healing reads.

pub mod cleanup;
pub mod entry;
pub mod expiry;
pub mod fs;
pub mod paths;
pub mod stats;
pub mod store;

pub use cleanup::ORPHANED_TEMP_AGE;
pub use entry::{CURRENT_VERSION, CacheKey, Entry, Meta};
pub use expiry::Freshness;
pub use fs::{FileInfo, FileSystem, MemFs, OsFs};
pub use stats::CacheStats;
pub use store::Store;
