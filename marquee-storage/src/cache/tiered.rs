//! Two-tier cache: a capped memory tier in front of a persistent store.
//!
//! # Reads
//!
//! [`TieredCache::get`] serves fresh memory entries without touching the
//! store. On a memory miss it consults the store and promotes a fresh hit
//! into memory. Unreadable persisted entries are deleted and treated as
//! absent. Store failures are logged and read as a miss.
//!
//! # Writes
//!
//! [`TieredCache::set`] always lands in memory. The persistent write is
//! attempted once; on a quota failure the oldest persisted entries are
//! evicted and the write is retried exactly once. Any remaining failure
//! leaves the entry cached in memory only and is reported through
//! [`SetOutcome`], never as an error. Only writes that reached the store
//! are announced to other contexts on the change bus.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use marquee_core::{CacheSettings, Clock, ContextId, StorageError, SystemClock, Timestamp};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::bus::{CacheChange, ChangeBus, ChangeKind, StorageEvent};
use super::entry::CacheEntry;
use super::freshness::{CacheRead, ReadOrigin};
use super::lmdb_backend::LmdbStore;
use super::memory::MemoryTier;
use super::stats::{CacheStats, StatsCounters};
use super::store::{MemoryStore, PersistentStore};

/// Configuration for the tiered cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prefix of every persisted key owned by this cache.
    pub namespace: String,
    /// Entry cap of the memory tier.
    pub max_memory_entries: usize,
    /// Persistent entries evicted on a quota failure before the retry.
    pub quota_evict_count: usize,
    /// Interval of the background cleanup sweep.
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from(&CacheSettings::default())
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            namespace: settings.namespace.clone(),
            max_memory_entries: settings.max_memory_entries,
            quota_evict_count: settings.quota_evict_count,
            cleanup_interval: settings.cleanup_interval(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_memory_entries = max;
        self
    }

    pub fn with_quota_evict_count(mut self, count: usize) -> Self {
        self.quota_evict_count = count;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

/// How a `set` was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    /// Written to both tiers; `evicted` persistent entries were removed to
    /// make room.
    Persisted { evicted: usize },
    /// Cached in memory only; the persistent write failed.
    MemoryOnly { reason: StorageError },
    /// The value could not be serialized and was not cached at all.
    Rejected { reason: StorageError },
}

impl SetOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted { .. })
    }

    pub fn is_cached(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Result of a cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub expired_removed: usize,
    pub corrupt_removed: usize,
    pub memory_expired: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.expired_removed + self.corrupt_removed + self.memory_expired
    }
}

/// Two-tier read-through cache.
///
/// `Send + Sync`; construct once and share through `Arc`.
pub struct TieredCache {
    config: CacheConfig,
    context: ContextId,
    memory: RwLock<MemoryTier>,
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn Clock>,
    bus: Option<ChangeBus>,
    stats: StatsCounters,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("context", &self.context)
            .field("namespace", &self.config.namespace)
            .field("store", &self.store)
            .finish()
    }
}

impl TieredCache {
    pub fn new(store: Arc<dyn PersistentStore>, config: CacheConfig) -> Self {
        Self {
            memory: RwLock::new(MemoryTier::new(config.max_memory_entries)),
            config,
            context: ContextId::new(),
            store,
            clock: Arc::new(SystemClock),
            bus: None,
            stats: StatsCounters::default(),
        }
    }

    /// Build from settings, opening LMDB when a path is configured and
    /// falling back to an in-process store otherwise.
    pub fn from_settings(settings: &CacheSettings) -> Result<Self, StorageError> {
        let store: Arc<dyn PersistentStore> = match &settings.lmdb_path {
            Some(path) => Arc::new(LmdbStore::open(path, settings.lmdb_max_size_mb)?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::new(store, CacheConfig::from(settings)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_bus(mut self, bus: ChangeBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn bus(&self) -> Option<&ChangeBus> {
        self.bus.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub(crate) fn counters(&self) -> &StatsCounters {
        &self.stats
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.config.namespace, key)
    }

    // Poisoning is recovered: every tier mutation is a single map operation.
    fn memory_read(&self) -> RwLockReadGuard<'_, MemoryTier> {
        self.memory.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn memory_write(&self) -> RwLockWriteGuard<'_, MemoryTier> {
        self.memory.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remember(&self, entry: CacheEntry) {
        if let Some(evicted) = self.memory_write().insert(entry) {
            StatsCounters::bump(&self.stats.memory_evictions);
            tracing::trace!(key = %evicted, "Evicted oldest memory entry");
        }
    }

    fn publish(&self, kind: ChangeKind) {
        if let Some(bus) = &self.bus {
            bus.publish(CacheChange {
                origin: self.context,
                kind,
            });
        }
    }

    /// Delete an unreadable persisted entry. Returns whether the delete went
    /// through.
    fn drop_corrupt(&self, storage_key: &str, error: &StorageError) -> bool {
        tracing::warn!(key = %storage_key, error = %error, "Removing corrupt cache entry");
        match self.store.remove(storage_key) {
            Ok(_) => {
                StatsCounters::bump(&self.stats.corrupt_removed);
                true
            }
            Err(e) => {
                tracing::warn!(key = %storage_key, error = %e, "Failed to remove corrupt cache entry");
                false
            }
        }
    }

    /// Load and decode a persisted entry. Corrupt entries are deleted.
    fn load_persisted(&self, key: &str) -> Option<CacheEntry> {
        let storage_key = self.storage_key(key);
        match self.store.get(&storage_key) {
            Ok(Some(raw)) => match CacheEntry::decode(&storage_key, &raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    self.drop_corrupt(&storage_key, &e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Persistent cache read failed");
                None
            }
        }
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Fresh entry with its origin, or `None`.
    pub fn get_entry(&self, key: &str) -> Option<CacheRead<Value>> {
        let now = self.now();

        let cached = self
            .memory_read()
            .get(key)
            .filter(|entry| entry.is_fresh_at(now))
            .cloned();
        if let Some(entry) = cached {
            StatsCounters::bump(&self.stats.hits);
            return Some(CacheRead::new(
                entry.value,
                entry.stored_at,
                entry.expires_at,
                ReadOrigin::Memory,
            ));
        }

        match self.load_persisted(key).filter(|entry| entry.is_fresh_at(now)) {
            Some(entry) => {
                StatsCounters::bump(&self.stats.hits);
                let read = CacheRead::new(
                    entry.value.clone(),
                    entry.stored_at,
                    entry.expires_at,
                    ReadOrigin::Persistent,
                );
                self.remember(entry);
                Some(read)
            }
            None => {
                StatsCounters::bump(&self.stats.misses);
                None
            }
        }
    }

    /// Fresh value for `key`. A value that does not deserialize into `T`
    /// reads as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let read = self.get_entry(key)?;
        decode_value(key, read.into_value())
    }

    /// Whatever is stored under `key`, fresh or not. When both tiers hold
    /// the key the later `stored_at` wins, memory on a tie; nothing is
    /// promoted.
    pub fn get_stale_entry(&self, key: &str) -> Option<CacheEntry> {
        let cached = self.memory_read().get(key).cloned();
        match (cached, self.load_persisted(key)) {
            (Some(cached), Some(persisted)) if persisted.stored_at > cached.stored_at => {
                Some(persisted)
            }
            (Some(cached), _) => Some(cached),
            (None, persisted) => persisted,
        }
    }

    pub fn get_stale<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.get_stale_entry(key)?;
        decode_value(key, entry.value)
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Store `value` in both tiers, expiring `ttl` from now.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> SetOutcome {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                let reason = StorageError::Serialization {
                    reason: e.to_string(),
                };
                tracing::warn!(key = %key, error = %reason, "Value not cacheable");
                return SetOutcome::Rejected { reason };
            }
        };
        let entry = CacheEntry::new(key, value, self.now(), ttl);
        self.set_entry(entry)
    }

    /// Store a prepared entry in both tiers.
    pub fn set_entry(&self, entry: CacheEntry) -> SetOutcome {
        let key = entry.key.clone();
        let outcome = match entry.encode() {
            Ok(raw) => self.persist(&key, &raw),
            Err(reason) => SetOutcome::MemoryOnly { reason },
        };

        match &outcome {
            SetOutcome::Persisted { .. } => {
                self.remember(entry.clone());
                self.publish(ChangeKind::Set { entry });
            }
            SetOutcome::MemoryOnly { reason } => {
                StatsCounters::bump(&self.stats.degraded_writes);
                tracing::warn!(key = %key, error = %reason, "Cache entry kept in memory only");
                self.remember(entry);
            }
            SetOutcome::Rejected { .. } => {}
        }
        outcome
    }

    fn persist(&self, key: &str, raw: &str) -> SetOutcome {
        let storage_key = self.storage_key(key);
        match self.store.set(&storage_key, raw) {
            Ok(()) => SetOutcome::Persisted { evicted: 0 },
            Err(e) if e.is_quota_exceeded() => {
                let evicted = self.evict_oldest(self.config.quota_evict_count);
                tracing::info!(key = %key, evicted, "Storage quota exceeded, evicted oldest entries");
                match self.store.set(&storage_key, raw) {
                    Ok(()) => SetOutcome::Persisted { evicted },
                    Err(reason) => SetOutcome::MemoryOnly { reason },
                }
            }
            Err(reason) => SetOutcome::MemoryOnly { reason },
        }
    }

    /// Delete the `count` oldest persisted entries by `stored_at`.
    /// Unreadable entries go first. Returns how many were removed.
    pub fn evict_oldest(&self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }

        let keys = match self.store.keys_with_prefix(&self.config.namespace) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list persistent cache keys for eviction");
                return 0;
            }
        };

        let mut aged: Vec<(Option<Timestamp>, String)> = keys
            .into_iter()
            .map(|storage_key| {
                let stored_at = self
                    .store
                    .get(&storage_key)
                    .ok()
                    .flatten()
                    .and_then(|raw| CacheEntry::decode(&storage_key, &raw).ok())
                    .map(|entry| entry.stored_at);
                (stored_at, storage_key)
            })
            .collect();
        // None sorts before Some, so unreadable entries are evicted first
        aged.sort();

        let mut evicted = 0;
        for (_, storage_key) in aged.into_iter().take(count) {
            match self.store.remove(&storage_key) {
                Ok(true) => evicted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(key = %storage_key, error = %e, "Failed to evict cache entry");
                }
            }
        }

        StatsCounters::add(&self.stats.quota_evictions, evicted as u64);
        evicted
    }

    /// Remove `key` from both tiers. Other contexts are only notified when
    /// the persistent delete succeeded.
    pub fn remove(&self, key: &str) {
        self.memory_write().remove(key);
        match self.store.remove(&self.storage_key(key)) {
            Ok(_) => self.publish(ChangeKind::Removed {
                key: key.to_string(),
            }),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to remove persistent cache entry");
            }
        }
    }

    /// Remove every key starting with `prefix` from both tiers; an empty
    /// prefix clears the whole namespace. Returns the number of persisted
    /// entries removed.
    pub fn clear(&self, prefix: &str) -> usize {
        self.memory_write().remove_prefix(prefix);

        let storage_prefix = self.storage_key(prefix);
        match self.store.keys_with_prefix(&storage_prefix) {
            Ok(keys) => {
                let removed = keys
                    .iter()
                    .filter(|storage_key| matches!(self.store.remove(storage_key), Ok(true)))
                    .count();
                self.publish(ChangeKind::Cleared {
                    prefix: prefix.to_string(),
                });
                removed
            }
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "Failed to list persistent cache keys");
                0
            }
        }
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Sweep expired and unreadable entries from the persistent tier and
    /// expired entries from memory.
    pub fn cleanup(&self) -> CleanupReport {
        let now = self.now();
        let mut report = CleanupReport {
            memory_expired: self.memory_write().remove_expired(now),
            ..Default::default()
        };

        let keys = match self.store.keys_with_prefix(&self.config.namespace) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "Cache cleanup could not list persistent keys");
                return report;
            }
        };

        for storage_key in keys {
            let raw = match self.store.get(&storage_key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(key = %storage_key, error = %e, "Cache cleanup read failed");
                    continue;
                }
            };

            let expired = match CacheEntry::decode(&storage_key, &raw) {
                Ok(entry) => entry.is_expired_at(now),
                Err(e) => {
                    if self.drop_corrupt(&storage_key, &e) {
                        report.corrupt_removed += 1;
                    }
                    continue;
                }
            };

            if expired {
                match self.store.remove(&storage_key) {
                    Ok(_) => report.expired_removed += 1,
                    Err(e) => {
                        tracing::warn!(key = %storage_key, error = %e, "Cache cleanup delete failed");
                    }
                }
            }
        }

        report
    }

    // ========================================================================
    // CROSS-CONTEXT SYNC
    // ========================================================================

    /// Apply a change published by another context to the memory tier.
    /// Changes this context published itself are ignored. Returns whether
    /// anything was applied.
    pub fn apply_change(&self, change: &CacheChange) -> bool {
        if change.origin == self.context {
            return false;
        }

        let mut memory = self.memory_write();
        match &change.kind {
            ChangeKind::Set { entry } => {
                if memory.insert(entry.clone()).is_some() {
                    StatsCounters::bump(&self.stats.memory_evictions);
                }
            }
            ChangeKind::Removed { key } => {
                memory.remove(key);
            }
            ChangeKind::Cleared { prefix } => {
                memory.remove_prefix(prefix);
            }
        }
        true
    }

    /// Bridge a native storage-change event into the memory tier. Events
    /// outside this cache's namespace are ignored.
    pub fn apply_storage_event(&self, event: &StorageEvent) -> bool {
        let Some(key) = event.key.strip_prefix(&self.config.namespace) else {
            return false;
        };

        let decoded = event
            .new_value
            .as_deref()
            .map(|raw| CacheEntry::decode(&event.key, raw));

        let mut memory = self.memory_write();
        match decoded {
            Some(Ok(entry)) if entry.key == key => {
                memory.insert(entry);
            }
            Some(Ok(_)) | Some(Err(_)) | None => {
                memory.remove(key);
            }
        }
        true
    }

    /// Snapshot of the counters and tier sizes.
    pub fn stats(&self) -> CacheStats {
        let memory_entries = self.memory_read().len() as u64;
        let persistent_entries = self
            .store
            .keys_with_prefix(&self.config.namespace)
            .map(|keys| keys.len() as u64)
            .unwrap_or(0);
        self.stats.snapshot(memory_entries, persistent_entries)
    }

    /// Whether the memory tier currently holds `key`, fresh or not.
    pub fn in_memory(&self, key: &str) -> bool {
        self.memory_read().contains(key)
    }
}

fn decode_value<T: DeserializeOwned>(key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(key = %key, error = %e, "Cached value has unexpected shape");
            None
        }
    }
}
