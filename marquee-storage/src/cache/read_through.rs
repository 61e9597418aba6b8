//! Read-through access with stale fallback.
//!
//! Callers describe how to fetch a value on a miss; the cache decides
//! whether the fetch is needed and what to return when it fails.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::freshness::{CacheRead, ReadOrigin};
use super::stats::StatsCounters;
use super::tiered::TieredCache;

impl TieredCache {
    /// Return the fresh value for `key`, fetching and storing it on a miss.
    ///
    /// If the fetch fails and an expired value is still stored, that value
    /// is served with [`ReadOrigin::Stale`]. The fetch error is returned
    /// only when there is nothing to fall back on.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<CacheRead<T>, E>
    where
        T: Serialize + DeserializeOwned,
        E: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(read) = self.get_entry(key) {
            let origin = read.origin();
            let (stored_at, expires_at) = (read.stored_at(), read.expires_at());
            if let Ok(value) = serde_json::from_value::<T>(read.into_value()) {
                return Ok(CacheRead::new(value, stored_at, expires_at, origin));
            }
        }

        match fetch().await {
            Ok(value) => {
                let now = self.now();
                let outcome = self.set(key, &value, ttl);
                if !outcome.is_persisted() {
                    tracing::debug!(key = %key, outcome = ?outcome, "Fetched value not persisted");
                }
                let expires_at = chrono::Duration::from_std(ttl)
                    .ok()
                    .and_then(|ttl| now.checked_add_signed(ttl))
                    .unwrap_or(now);
                Ok(CacheRead::new(value, now, expires_at, ReadOrigin::Source))
            }
            Err(error) => {
                let stale = self.get_stale_entry(key).and_then(|entry| {
                    serde_json::from_value::<T>(entry.value)
                        .ok()
                        .map(|value| CacheRead::new(value, entry.stored_at, entry.expires_at, ReadOrigin::Stale))
                });

                match stale {
                    Some(read) => {
                        StatsCounters::bump(&self.counters().stale_serves);
                        tracing::warn!(
                            key = %key,
                            error = %error,
                            stored_at = %read.stored_at(),
                            "Fetch failed, serving stale cache entry"
                        );
                        Ok(read)
                    }
                    None => {
                        tracing::warn!(key = %key, error = %error, "Fetch failed with no cached fallback");
                        Err(error)
                    }
                }
            }
        }
    }
}
