//! Cache entry and its persisted encoding.

use std::time::Duration;

use marquee_core::{StorageError, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cached value with its storage and expiry timestamps.
///
/// Persisted as a JSON document under the namespaced key, so any context
/// sharing the store can decode it without extra framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub stored_at: Timestamp,
    pub expires_at: Timestamp,
}

impl CacheEntry {
    /// Build an entry stored at `now` that expires `ttl` later.
    pub fn new(key: impl Into<String>, value: Value, now: Timestamp, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(Timestamp::MAX_UTC);
        Self {
            key: key.into(),
            value,
            stored_at: now,
            expires_at,
        }
    }

    /// Fresh iff `now < expires_at`.
    pub fn is_fresh_at(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        !self.is_fresh_at(now)
    }

    /// Age of the entry at `now`; zero if the clock moved backwards.
    pub fn age_at(&self, now: Timestamp) -> Duration {
        (now - self.stored_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn encode(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Decode a persisted entry. Anything that does not parse into a
    /// complete entry is reported as corrupt.
    pub fn decode(storage_key: &str, raw: &str) -> Result<Self, StorageError> {
        serde_json::from_str(raw).map_err(|e| StorageError::Corrupt {
            key: storage_key.to_string(),
            reason: e.to_string(),
        })
    }
}
