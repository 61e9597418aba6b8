//! Persistent tier abstraction.
//!
//! The persistent tier is a synchronous string key-value store with a
//! finite quota. Implementations report a full store as
//! [`StorageError::QuotaExceeded`] so the cache can evict and retry.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::RwLock;

use marquee_core::StorageError;

/// Durable key-value store backing the persistent cache tier.
///
/// Writes are applied synchronously, so same-key writes from one context
/// land in call order.
pub trait PersistentStore: Send + Sync + Debug {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, StorageError>;

    /// All keys currently stored.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }
}

/// In-process persistent store with an optional byte quota.
///
/// Stands in for durable storage when no LMDB path is configured, and in
/// tests that need a deterministic quota.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the summed size of keys and values.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.data
            .read()
            .map(|data| data.iter().map(|(k, v)| k.len() + v.len()).sum())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.data.read().map(|data| data.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;

        if let Some(quota) = self.quota_bytes {
            let used: usize = data.iter().map(|(k, v)| k.len() + v.len()).sum();
            let replaced = data.get(key).map(|old| key.len() + old.len()).unwrap_or(0);
            if used - replaced + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }

        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data.keys().cloned().collect())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
