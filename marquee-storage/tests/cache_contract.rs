//! End-to-end properties of the tiered cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use marquee_core::{Clock, ManualClock, Timestamp};
use marquee_storage::{
    CacheConfig, CacheEntry, LmdbStore, MemoryStore, PersistentStore, ReadOrigin, SetOutcome,
    TieredCache,
};
use proptest::prelude::*;
use serde_json::json;
use tempfile::TempDir;

fn epoch() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid date")
}

fn persisted_size(key: &str, now: Timestamp, ttl: Duration) -> usize {
    let entry = CacheEntry::new(key, json!({"title": "padding"}), now, ttl);
    let raw = entry.encode().expect("encode should succeed");
    "marquee:".len() + key.len() + raw.len()
}

#[test]
fn quota_failure_evicts_oldest_and_retries_once() {
    let clock = Arc::new(ManualClock::new(epoch()));
    let ttl = Duration::from_secs(3600);
    let size = persisted_size("item:00", clock.now(), ttl);
    let store = Arc::new(MemoryStore::with_quota(size * 10 + size / 2));
    let cache = TieredCache::new(store.clone(), CacheConfig::new().with_quota_evict_count(5))
        .with_clock(clock.clone());

    for i in 0..10 {
        let outcome = cache.set(&format!("item:{i:02}"), &json!({"title": "padding"}), ttl);
        assert_eq!(outcome, SetOutcome::Persisted { evicted: 0 });
        clock.advance(Duration::from_secs(1));
    }

    let outcome = cache.set("item:10", &json!({"title": "padding"}), ttl);
    assert_eq!(outcome, SetOutcome::Persisted { evicted: 5 });

    let mut keys = store.keys().expect("keys should list");
    keys.sort();
    let expected: Vec<String> = (5..=10).map(|i| format!("marquee:item:{i:02}")).collect();
    assert_eq!(keys, expected);
    assert_eq!(cache.stats().quota_evictions, 5);
}

#[test]
fn failed_retry_degrades_to_memory_only() {
    let clock = Arc::new(ManualClock::new(epoch()));
    // Smaller than any single entry: every persistent write fails.
    let store = Arc::new(MemoryStore::with_quota(16));
    let cache = TieredCache::new(store.clone(), CacheConfig::new()).with_clock(clock.clone());

    let outcome = cache.set("info:1", &json!({"title": "Heat"}), Duration::from_secs(60));
    assert!(matches!(outcome, SetOutcome::MemoryOnly { ref reason } if reason.is_quota_exceeded()));
    assert!(outcome.is_cached());
    assert!(store.is_empty());

    let read = cache.get_entry("info:1").expect("memory write stands");
    assert_eq!(read.origin(), ReadOrigin::Memory);
    assert_eq!(cache.stats().degraded_writes, 1);
}

#[test]
fn lmdb_backed_cache_survives_restart() {
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    let clock = Arc::new(ManualClock::new(epoch()));

    {
        let store = Arc::new(LmdbStore::open(temp_dir.path(), 10).expect("open should succeed"));
        let cache = TieredCache::new(store, CacheConfig::new()).with_clock(clock.clone());
        let outcome = cache.set("sources:42:0:0", &json!(["https://cdn/a.mp4"]), Duration::from_secs(600));
        assert!(outcome.is_persisted());
    }

    let store = Arc::new(LmdbStore::open(temp_dir.path(), 10).expect("reopen should succeed"));
    let cache = TieredCache::new(store, CacheConfig::new()).with_clock(clock.clone());
    let read = cache.get_entry("sources:42:0:0").expect("entry should persist");
    assert_eq!(read.origin(), ReadOrigin::Persistent);
    assert_eq!(read.into_value(), json!(["https://cdn/a.mp4"]));

    clock.advance(Duration::from_secs(600));
    let report = cache.cleanup();
    assert_eq!(report.expired_removed, 1);
}

#[test]
fn corrupt_entry_written_by_another_context_is_dropped() {
    let store = Arc::new(MemoryStore::new());
    store
        .set("marquee:search:dune", "{\"key\":\"search:dune\"")
        .expect("set should succeed");
    let cache = TieredCache::new(store.clone(), CacheConfig::new());

    assert!(cache.get_entry("search:dune").is_none());
    assert!(cache.get_stale_entry("search:dune").is_none());
    assert!(store.is_empty());
}

proptest! {
    #[test]
    fn prop_fresh_until_ttl_then_stale_only(ttl_secs in 1u64..100_000, elapsed_secs in 0u64..200_000) {
        let clock = Arc::new(ManualClock::new(epoch()));
        let cache = TieredCache::new(Arc::new(MemoryStore::new()), CacheConfig::new())
            .with_clock(clock.clone());

        cache.set("k", &elapsed_secs, Duration::from_secs(ttl_secs));
        clock.advance(Duration::from_secs(elapsed_secs));

        if elapsed_secs < ttl_secs {
            prop_assert_eq!(cache.get::<u64>("k"), Some(elapsed_secs));
        } else {
            prop_assert_eq!(cache.get::<u64>("k"), None);
        }
        prop_assert_eq!(cache.get_stale::<u64>("k"), Some(elapsed_secs));
    }

    #[test]
    fn prop_memory_never_exceeds_cap(cap in 1usize..20, writes in 0usize..60) {
        let cache = TieredCache::new(
            Arc::new(MemoryStore::new()),
            CacheConfig::new().with_max_entries(cap),
        );
        for i in 0..writes {
            cache.set(&format!("k{i}"), &i, Duration::from_secs(60));
        }
        let stats = cache.stats();
        prop_assert_eq!(stats.memory_entries as usize, writes.min(cap));
        prop_assert_eq!(stats.persistent_entries as usize, writes);
    }
}
