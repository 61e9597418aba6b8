//! Freshness metadata carried by cache reads.

use std::time::Duration;

use marquee_core::Timestamp;

/// Where a read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadOrigin {
    /// Fresh entry in the memory tier.
    Memory,
    /// Fresh entry in the persistent tier, now promoted into memory.
    Persistent,
    /// Fetched from the upstream source on this call.
    Source,
    /// Expired entry served because the upstream fetch failed.
    Stale,
}

/// Result of a cache read, carrying staleness metadata.
///
/// Callers that care whether they are looking at a fallback value check
/// [`CacheRead::is_stale`] instead of guessing.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    stored_at: Timestamp,
    expires_at: Timestamp,
    origin: ReadOrigin,
}

impl<T> CacheRead<T> {
    pub fn new(value: T, stored_at: Timestamp, expires_at: Timestamp, origin: ReadOrigin) -> Self {
        Self {
            value,
            stored_at,
            expires_at,
            origin,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn stored_at(&self) -> Timestamp {
        self.stored_at
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    pub fn origin(&self) -> ReadOrigin {
        self.origin
    }

    /// Served from either cache tier without calling the source.
    pub fn was_cache_hit(&self) -> bool {
        matches!(self.origin, ReadOrigin::Memory | ReadOrigin::Persistent)
    }

    pub fn is_stale(&self) -> bool {
        self.origin == ReadOrigin::Stale
    }

    /// How long ago the value was stored, as of `now`.
    pub fn age_at(&self, now: Timestamp) -> Duration {
        (now - self.stored_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            stored_at: self.stored_at,
            expires_at: self.expires_at,
            origin: self.origin,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
