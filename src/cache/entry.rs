// Cache entry envelope.
// Versioned metadata around an opaque, already-encoded JSON payload.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::value::RawValue;

use crate::error::{PylonError, Result};

/// On-disk format version. Entries written with any other version are
/// discarded on read.
pub const CURRENT_VERSION: u32 = 1;

/// Identifies one cached record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub device: String,
    /// Stable identifier that survives device renames. Empty when unknown.
    pub device_id: String,
    pub data_type: String,
}

impl CacheKey {
    pub fn new(device: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            device_id: String::new(),
            data_type: data_type.into(),
        }
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }
}

/// A cached record as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub version: u32,
    pub device: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_id: String,
    pub data_type: String,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// The payload, embedded as raw JSON. Never interpreted by the store.
    pub data: Box<RawValue>,
}

impl Entry {
    /// Encode `payload` and stamp a new entry expiring `ttl` from now.
    pub fn new<T: Serialize + ?Sized>(key: &CacheKey, payload: &T, ttl: Duration) -> Result<Self> {
        let data = serde_json::value::to_raw_value(payload).map_err(PylonError::Encode)?;
        let cached_at = Utc::now();

        Ok(Self {
            version: CURRENT_VERSION,
            device: key.device.clone(),
            device_id: key.device_id.clone(),
            data_type: key.data_type.clone(),
            cached_at,
            expires_at: expiry_after(cached_at, ttl),
            data,
        })
    }

    /// The key this entry is stored under.
    pub fn key(&self) -> CacheKey {
        CacheKey {
            device: self.device.clone(),
            device_id: self.device_id.clone(),
            data_type: self.data_type.clone(),
        }
    }

    /// Decode the payload into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(self.data.get()).map_err(PylonError::Decode)
    }

    /// Whether this entry was written with the current format version.
    pub fn is_current(&self) -> bool {
        self.version == CURRENT_VERSION
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(PylonError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(PylonError::Decode)
    }
}

/// `start + ttl`, saturating at the latest representable time.
fn expiry_after(start: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| start.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Singleton cache metadata, used to throttle cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub version: u32,
    pub last_cleanup: DateTime<Utc>,
}

impl Meta {
    pub fn new(last_cleanup: DateTime<Utc>) -> Self {
        Self {
            version: CURRENT_VERSION,
            last_cleanup,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(PylonError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(PylonError::Decode)
    }
}
