//! Error types for Marquee operations

use std::time::Duration;
use thiserror::Error;

/// Persistent storage and cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage quota exceeded while writing {key}")]
    QuotaExceeded { key: String },

    #[error("Persistent storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Whether this is the distinguished "storage full" condition that
    /// triggers eviction-and-retry.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Upstream fetch errors.
///
/// Every variant is transient from the cache's point of view: callers fall
/// back to stale data before surfacing any of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },

    #[error("Request to {endpoint} failed with status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Network error calling {endpoint}: {reason}")]
    Network { endpoint: String, reason: String },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

impl FetchError {
    /// Endpoint name the failing request was sent to.
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Timeout { endpoint, .. }
            | Self::Status { endpoint, .. }
            | Self::Network { endpoint, .. }
            | Self::InvalidResponse { endpoint, .. } => endpoint,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Playback source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("No playable source candidates")]
    NoCandidates,

    #[error("All {attempts} source candidates failed")]
    SourcesExhausted { attempts: usize },

    #[error("Candidate index {index} out of range for {len} candidates")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },
}

/// Subtitle fetch/convert errors. Never fatal to playback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptionError {
    #[error("Failed to fetch captions from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Caption document is empty")]
    EmptyDocument,

    #[error("Unsupported caption format: {format}")]
    UnsupportedFormat { format: String },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or MARQUEE_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to install tracing subscriber: {reason}")]
    Telemetry { reason: String },
}

/// Master error type for all Marquee errors.
#[derive(Debug, Error)]
pub enum MarqueeError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Caption error: {0}")]
    Caption(#[from] CaptionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Marquee operations.
pub type MarqueeResult<T> = Result<T, MarqueeError>;

// =============================================================================
// TESTS
// =============================================================================
