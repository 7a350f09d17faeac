// Error types for pylon.
// Covers cache I/O, payload encoding, and background refresh failures.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PylonError {
    #[error("failed to {op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode cache payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode cache payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

impl PylonError {
    /// Wrap a filesystem error with the operation and path it came from.
    pub fn io(op: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        PylonError::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PylonError>;
