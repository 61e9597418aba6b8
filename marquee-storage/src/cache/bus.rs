//! Cross-context change notifications.
//!
//! Every context sharing a persistent store publishes its writes on a
//! [`ChangeBus`]; the others replay them into their memory tier. Delivery
//! is best-effort: a lagging subscriber skips notifications and converges
//! on its next persistent read.

use marquee_core::ContextId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::entry::CacheEntry;

/// Default number of buffered notifications per subscriber.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// What changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    Set { entry: CacheEntry },
    Removed { key: String },
    Cleared { prefix: String },
}

/// A change published by one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheChange {
    pub origin: ContextId,
    pub kind: ChangeKind,
}

/// Native storage-change event as raised by a platform adapter.
///
/// `key` is the full storage key (namespace included); `new_value` is the
/// raw persisted document, or `None` when the key was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
}

/// Broadcast channel shared by every cache context.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<CacheChange>,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheChange> {
        self.sender.subscribe()
    }

    /// Publish a change. Returns the number of subscribers reached; zero
    /// subscribers is not an error.
    pub fn publish(&self, change: CacheChange) -> usize {
        self.sender.send(change).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
