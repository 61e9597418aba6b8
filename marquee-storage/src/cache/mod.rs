//! Two-tier cache with explicit freshness.
//!
//! A capped, insertion-ordered memory tier sits in front of a durable
//! [`PersistentStore`]. Every entry carries `stored_at` / `expires_at`;
//! ordinary reads only ever see fresh entries, while the stale path
//! ([`TieredCache::get_stale`]) exists for error fallback.
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(TieredCache::from_settings(&config.cache)?);
//! let _sweeper = MaintenanceJob::spawn(Arc::clone(&cache));
//!
//! let read = cache
//!     .get_or_fetch("search:dune", Duration::from_secs(300), || api.search("dune"))
//!     .await?;
//! if read.is_stale() {
//!     tracing::warn!("Showing cached results");
//! }
//! ```

pub mod bus;
pub mod entry;
pub mod freshness;
pub mod lmdb_backend;
pub mod maintenance;
pub mod memory;
pub mod read_through;
pub mod stats;
pub mod store;
pub mod tiered;

pub use bus::{CacheChange, ChangeBus, ChangeKind, StorageEvent, DEFAULT_BUS_CAPACITY};
pub use entry::CacheEntry;
pub use freshness::{CacheRead, ReadOrigin};
pub use lmdb_backend::{LmdbStore, LmdbStoreError};
pub use maintenance::{spawn_change_listener, ChangeListener, MaintenanceJob};
pub use memory::MemoryTier;
pub use stats::CacheStats;
pub use store::{MemoryStore, PersistentStore};
pub use tiered::{CacheConfig, CleanupReport, SetOutcome, TieredCache};
