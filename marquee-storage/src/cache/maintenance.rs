//! Background cache maintenance.
//!
//! Two long-running tasks keep a [`TieredCache`] healthy:
//!
//! - [`MaintenanceJob`]: sweeps expired and corrupt entries on startup and
//!   then every `cleanup_interval`.
//! - [`ChangeListener`]: replays changes published by other contexts into
//!   this context's memory tier.
//!
//! Both are handles: drop or shut them down on teardown.

use std::sync::Arc;
use std::time::Duration;

use marquee_core::RepeatingTask;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::tiered::TieredCache;

/// Periodic cleanup sweep.
pub struct MaintenanceJob;

impl MaintenanceJob {
    /// Spawn the sweep on the current runtime, using the cache's configured
    /// interval.
    pub fn spawn(cache: Arc<TieredCache>) -> RepeatingTask {
        let interval = cache.config().cleanup_interval;
        Self::spawn_with_interval(cache, interval)
    }

    pub fn spawn_with_interval(cache: Arc<TieredCache>, interval: Duration) -> RepeatingTask {
        tracing::info!(
            interval_secs = interval.as_secs(),
            namespace = %cache.config().namespace,
            "Starting cache maintenance job"
        );

        RepeatingTask::spawn("cache-maintenance", interval, move || {
            let cache = Arc::clone(&cache);
            async move {
                let report = cache.cleanup();
                if report.total() > 0 {
                    tracing::info!(
                        expired = report.expired_removed,
                        corrupt = report.corrupt_removed,
                        memory_expired = report.memory_expired,
                        "Cache cleanup removed entries"
                    );
                } else {
                    tracing::debug!("Cache cleanup found nothing to remove");
                }
            }
        })
    }
}

/// Handle to a running change listener.
#[derive(Debug)]
pub struct ChangeListener {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<u64>>,
}

impl ChangeListener {
    pub fn cancel(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop listening and wait. Returns the number of changes applied.
    pub async fn shutdown(mut self) -> u64 {
        self.cancel();
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for ChangeListener {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Subscribe `cache` to its change bus and apply remote changes until the
/// returned handle is cancelled. Returns `None` when the cache has no bus.
pub fn spawn_change_listener(cache: Arc<TieredCache>) -> Option<ChangeListener> {
    let mut rx = cache.bus()?.subscribe();
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut applied = 0u64;
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                received = rx.recv() => {
                    match received {
                        Ok(change) => {
                            if cache.apply_change(&change) {
                                applied += 1;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Change listener lagged, notifications dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        tracing::debug!(applied, context = %cache.context(), "Change listener stopped");
        applied
    });

    Some(ChangeListener {
        shutdown_tx,
        handle: Some(handle),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, ChangeBus, MemoryStore, PersistentStore};
    use marquee_core::ManualClock;

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_runs_on_startup_and_interval() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(
            TieredCache::new(store.clone(), CacheConfig::new()).with_clock(clock.clone()),
        );

        store.set("marquee:junk", "###").expect("set should succeed");
        let job = MaintenanceJob::spawn_with_interval(Arc::clone(&cache), Duration::from_secs(300));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.is_empty(), "startup sweep should remove the corrupt entry");

        cache.set("short", &1, Duration::from_secs(60));
        clock.advance(Duration::from_secs(61));
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(store.is_empty(), "interval sweep should remove the expired entry");

        assert_eq!(job.shutdown().await, 2);
    }

    #[tokio::test]
    async fn test_change_listener_syncs_memory_tiers() {
        let bus = ChangeBus::default();
        let store = Arc::new(MemoryStore::new());
        let tab_a = Arc::new(TieredCache::new(store.clone(), CacheConfig::new()).with_bus(bus.clone()));
        let tab_b = Arc::new(TieredCache::new(store.clone(), CacheConfig::new()).with_bus(bus.clone()));

        let listener = spawn_change_listener(Arc::clone(&tab_b)).expect("bus is configured");

        tab_a.set("search:dune", &"v1", Duration::from_secs(60));
        tab_a.remove("search:dune");
        tab_a.set("info:1", &"v2", Duration::from_secs(60));

        // wait until the listener has caught up
        for _ in 0..100 {
            if tab_b.in_memory("info:1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(tab_b.in_memory("info:1"));
        assert!(!tab_b.in_memory("search:dune"));
        assert_eq!(listener.shutdown().await, 3);
    }

    #[test]
    fn test_listener_requires_bus() {
        let cache = Arc::new(TieredCache::new(Arc::new(MemoryStore::new()), CacheConfig::new()));
        assert!(spawn_change_listener(cache).is_none());
    }
}
