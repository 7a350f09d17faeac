// Refresh coordination for cache consumers.
// Serve cached data immediately, refresh stale data in the background.

pub mod coordinator;
pub mod events;

pub use coordinator::RefreshCoordinator;
pub use events::{CacheEvent, LoadOutcome};
