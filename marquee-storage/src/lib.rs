//! Marquee Storage
//!
//! The tiered cache that sits between page controllers and the upstream
//! catalog API: an in-memory tier, a persistent tier (LMDB or in-process),
//! cross-context change notifications and background maintenance.

pub mod cache;

pub use cache::{
    spawn_change_listener, CacheChange, CacheConfig, CacheEntry, CacheRead, CacheStats,
    ChangeBus, ChangeKind, ChangeListener, CleanupReport, LmdbStore, LmdbStoreError,
    MaintenanceJob, MemoryStore, MemoryTier, PersistentStore, ReadOrigin, SetOutcome,
    StorageEvent, TieredCache,
};
