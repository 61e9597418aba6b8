//! Marquee Core - Shared Types
//!
//! Data structures, error taxonomy and configuration shared by every
//! Marquee crate. Policy lives in `marquee-storage` (caching) and
//! `marquee-playback` (source selection).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod clock;
pub mod config;
pub mod error;
pub mod media;
pub mod task;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ApiSettings, CacheSettings, LoggingConfig, MarqueeConfig, PlaybackSettings};
pub use error::{
    CaptionError, ConfigError, FetchError, MarqueeError, MarqueeResult, PlaybackError,
    StorageError,
};
pub use media::{parse_resolution, ConnectionEstimate, MediaFormat, QualityTier, SourceCandidate};
pub use task::RepeatingTask;
pub use telemetry::init_tracing;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Identifier of one execution context (a browser tab, a process) sharing
/// the persistent cache tier with others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generate a new timestamp-sortable context id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_ids_are_unique() {
        let a = ContextId::new();
        let b = ContextId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }
}
