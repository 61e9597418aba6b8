//! Insertion-ordered, entry-capped memory tier.

use indexmap::IndexMap;
use marquee_core::Timestamp;

use super::entry::CacheEntry;

/// In-memory tier holding at most `capacity` entries.
///
/// When full, inserting a new key evicts the oldest-inserted entry.
/// Overwriting an existing key keeps its position and never evicts.
#[derive(Debug)]
pub struct MemoryTier {
    entries: IndexMap<String, CacheEntry>,
    capacity: usize,
}

impl MemoryTier {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: IndexMap::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite. Returns the key evicted to make room, if any.
    pub fn insert(&mut self, entry: CacheEntry) -> Option<String> {
        if let Some(slot) = self.entries.get_mut(&entry.key) {
            *slot = entry;
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0).map(|(key, _)| key)
        } else {
            None
        };
        self.entries.insert(entry.key.clone(), entry);
        evicted
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.shift_remove(key)
    }

    /// Remove every key starting with `prefix`. Returns how many went.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before - self.entries.len()
    }

    /// Drop entries expired at `now`. Returns how many went.
    pub fn remove_expired(&mut self, now: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh_at(now));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keys in insertion order, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;

    fn entry(key: &str, ttl_secs: u64) -> CacheEntry {
        CacheEntry::new(key, json!(key), Utc::now(), Duration::from_secs(ttl_secs))
    }

    #[test]
    fn test_evicts_oldest_inserted() {
        let mut tier = MemoryTier::new(3);
        assert_eq!(tier.insert(entry("a", 60)), None);
        assert_eq!(tier.insert(entry("b", 60)), None);
        assert_eq!(tier.insert(entry("c", 60)), None);

        assert_eq!(tier.insert(entry("d", 60)), Some("a".to_string()));
        assert_eq!(tier.len(), 3);
        assert_eq!(tier.keys().collect::<Vec<_>>(), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_overwrite_keeps_position_and_never_evicts() {
        let mut tier = MemoryTier::new(2);
        tier.insert(entry("a", 60));
        tier.insert(entry("b", 60));

        let mut updated = entry("a", 60);
        updated.value = json!("updated");
        assert_eq!(tier.insert(updated), None);
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.get("a").map(|e| e.value.clone()), Some(json!("updated")));

        // "a" is still the oldest insertion
        assert_eq!(tier.insert(entry("c", 60)), Some("a".to_string()));
    }

    #[test]
    fn test_remove_prefix_and_expired() {
        let mut tier = MemoryTier::new(10);
        tier.insert(entry("search:a", 60));
        tier.insert(entry("search:b", 60));
        tier.insert(entry("info:1", 0));

        assert_eq!(tier.remove_prefix("search:"), 2);
        assert_eq!(tier.remove_expired(Utc::now()), 1);
        assert!(tier.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut tier = MemoryTier::new(0);
        assert_eq!(tier.capacity(), 1);
        tier.insert(entry("a", 60));
        assert_eq!(tier.insert(entry("b", 60)), Some("a".to_string()));
    }
}
