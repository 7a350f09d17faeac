// State management module.
// Tracks what panels show for cached device data.

pub mod cached;
pub mod loading;

pub use cached::{CachedView, NextStep};
pub use loading::LoadingState;
