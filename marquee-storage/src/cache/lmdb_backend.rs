//! LMDB-backed persistent store.
//!
//! Uses the heed crate (Rust bindings for LMDB). The environment's map
//! size is the storage quota: a write that does not fit fails with
//! `MDB_MAP_FULL`, which is reported as [`StorageError::QuotaExceeded`].
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `get` and key listing
//! - One write transaction per `set` / `remove`

use std::path::Path;

use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions, MdbError};
use marquee_core::StorageError;

use super::store::PersistentStore;

/// Error type for opening the LMDB store.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for StorageError {
    fn from(e: LmdbStoreError) -> Self {
        StorageError::Unavailable {
            reason: e.to_string(),
        }
    }
}

/// Map a heed error raised while touching `key`.
fn map_heed_error(key: &str, e: heed::Error) -> StorageError {
    match e {
        heed::Error::Mdb(MdbError::MapFull) => StorageError::QuotaExceeded {
            key: key.to_string(),
        },
        other => StorageError::Unavailable {
            reason: other.to_string(),
        },
    }
}

/// Persistent store in a single unnamed LMDB database.
pub struct LmdbStore {
    env: Env,
    db: Database<Str, Str>,
}

impl std::fmt::Debug for LmdbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbStore")
            .field("path", &self.env.path())
            .finish()
    }
}

impl LmdbStore {
    /// Open (or create) the store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Map size in megabytes, i.e. the storage quota
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb.max(1) * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;
        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        Ok(Self { env, db })
    }

    /// Number of stored keys.
    pub fn len(&self) -> Result<u64, StorageError> {
        let rtxn = self.env.read_txn().map_err(|e| map_heed_error("", e))?;
        self.db.len(&rtxn).map_err(|e| map_heed_error("", e))
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl PersistentStore for LmdbStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let rtxn = self.env.read_txn().map_err(|e| map_heed_error(key, e))?;
        let value = self
            .db
            .get(&rtxn, key)
            .map_err(|e| map_heed_error(key, e))?;
        Ok(value.map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut wtxn = self.env.write_txn().map_err(|e| map_heed_error(key, e))?;
        self.db
            .put(&mut wtxn, key, value)
            .map_err(|e| map_heed_error(key, e))?;
        wtxn.commit().map_err(|e| map_heed_error(key, e))
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let mut wtxn = self.env.write_txn().map_err(|e| map_heed_error(key, e))?;
        let deleted = self
            .db
            .delete(&mut wtxn, key)
            .map_err(|e| map_heed_error(key, e))?;
        wtxn.commit().map_err(|e| map_heed_error(key, e))?;
        Ok(deleted)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.keys_with_prefix("")
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let rtxn = self.env.read_txn().map_err(|e| map_heed_error(prefix, e))?;
        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| map_heed_error(prefix, e))?;

        let mut keys = Vec::new();
        for result in iter {
            match result {
                Ok((key, _)) if key.starts_with(prefix) => keys.push(key.to_string()),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable LMDB record");
                }
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store(max_size_mb: usize) -> (LmdbStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbStore::open(temp_dir.path(), max_size_mb)
            .expect("store creation should succeed");
        (store, temp_dir)
    }

    #[test]
    fn test_set_get_remove() {
        let (store, _temp_dir) = create_test_store(10);

        store.set("marquee:a", "{\"v\":1}").expect("set should succeed");
        assert_eq!(
            store.get("marquee:a").expect("get should succeed"),
            Some("{\"v\":1}".to_string())
        );
        assert!(store.remove("marquee:a").expect("remove should succeed"));
        assert_eq!(store.get("marquee:a").expect("get should succeed"), None);
        assert!(store.is_empty().expect("len should succeed"));
    }

    #[test]
    fn test_keys_with_prefix() {
        let (store, _temp_dir) = create_test_store(10);
        for key in ["marquee:search:a", "marquee:info:1", "other"] {
            store.set(key, "x").expect("set should succeed");
        }

        let mut keys = store.keys_with_prefix("marquee:").expect("keys should list");
        keys.sort();
        assert_eq!(keys, vec!["marquee:info:1", "marquee:search:a"]);
        assert_eq!(store.len().expect("len should succeed"), 3);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let store = LmdbStore::open(temp_dir.path(), 10).expect("open should succeed");
            store.set("marquee:k", "v").expect("set should succeed");
        }
        let store = LmdbStore::open(temp_dir.path(), 10).expect("reopen should succeed");
        assert_eq!(store.get("marquee:k").expect("get should succeed"), Some("v".to_string()));
    }

    #[test]
    fn test_full_map_reports_quota_exceeded() {
        let (store, _temp_dir) = create_test_store(1);
        let payload = "x".repeat(64 * 1024);

        let mut failure = None;
        for i in 0..64 {
            if let Err(e) = store.set(&format!("marquee:{i}"), &payload) {
                failure = Some(e);
                break;
            }
        }

        let err = failure.expect("a 1 MiB map should fill up");
        assert!(err.is_quota_exceeded(), "unexpected error: {err}");
    }
}
