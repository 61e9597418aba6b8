//! Configuration types
//!
//! Loaded from TOML (`--config <path>` or `MARQUEE_CONFIG`), then patched
//! from `MARQUEE_*` environment variables and validated. Every section has
//! working defaults, so a config file only needs the values it changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Cache tier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheSettings {
    /// Prefix for every key the cache writes to persistent storage.
    pub namespace: String,
    /// Entry cap of the in-memory tier.
    pub max_memory_entries: usize,
    /// Oldest persistent entries evicted when a write hits the quota.
    pub quota_evict_count: usize,
    /// Interval of the background expiry sweep.
    pub cleanup_interval_secs: u64,
    /// LMDB directory; `None` keeps the persistent tier in memory.
    pub lmdb_path: Option<PathBuf>,
    /// LMDB map size, which acts as the storage quota.
    pub lmdb_max_size_mb: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            namespace: "marquee:".to_string(),
            max_memory_entries: 100,
            quota_evict_count: 5,
            cleanup_interval_secs: 300,
            lmdb_path: None,
            lmdb_max_size_mb: 50,
        }
    }
}

impl CacheSettings {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Upstream catalog API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ApiSettings {
    pub base_url: String,
    pub search_timeout_ms: u64,
    pub info_timeout_ms: u64,
    pub sources_timeout_ms: u64,
    pub subtitle_timeout_ms: u64,
    pub search_ttl_secs: u64,
    pub info_ttl_secs: u64,
    pub sources_ttl_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            search_timeout_ms: 8_000,
            info_timeout_ms: 10_000,
            sources_timeout_ms: 15_000,
            subtitle_timeout_ms: 10_000,
            search_ttl_secs: 300,
            info_ttl_secs: 3_600,
            sources_ttl_secs: 600,
        }
    }
}

impl ApiSettings {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn info_timeout(&self) -> Duration {
        Duration::from_millis(self.info_timeout_ms)
    }

    pub fn sources_timeout(&self) -> Duration {
        Duration::from_millis(self.sources_timeout_ms)
    }

    pub fn subtitle_timeout(&self) -> Duration {
        Duration::from_millis(self.subtitle_timeout_ms)
    }

    pub fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.search_ttl_secs)
    }

    pub fn info_ttl(&self) -> Duration {
        Duration::from_secs(self.info_ttl_secs)
    }

    pub fn sources_ttl(&self) -> Duration {
        Duration::from_secs(self.sources_ttl_secs)
    }
}

/// Playback and connection probing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PlaybackSettings {
    /// Resource downloaded to measure throughput; probing is off when unset.
    pub probe_url: Option<String>,
    pub probe_interval_secs: u64,
    pub probe_timeout_ms: u64,
    /// Move candidates the media element cannot stream behind the others.
    /// Off by default, so sessions keep pure resolution order.
    pub prefer_streamable: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            probe_url: None,
            probe_interval_secs: 30,
            probe_timeout_ms: 10_000,
            prefer_streamable: false,
        }
    }
}

impl PlaybackSettings {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Tracing output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `"info,marquee_storage=debug"`.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MarqueeConfig {
    pub cache: CacheSettings,
    pub api: ApiSettings,
    pub playback: PlaybackSettings,
    pub logging: LoggingConfig,
}

impl MarqueeConfig {
    /// Load from the path given by `--config` or `MARQUEE_CONFIG`, apply
    /// environment overrides, and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let mut config = Self::from_path(&path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `MARQUEE_*` environment variables on top of the loaded values.
    ///
    /// - `MARQUEE_API_BASE_URL`
    /// - `MARQUEE_CACHE_MAX_ENTRIES`
    /// - `MARQUEE_CACHE_LMDB_PATH`
    /// - `MARQUEE_PROBE_URL`
    /// - `MARQUEE_LOG`
    /// - `MARQUEE_LOG_JSON`
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MARQUEE_API_BASE_URL") {
            self.api.base_url = url;
        }
        if let Some(raw) = lookup("MARQUEE_CACHE_MAX_ENTRIES") {
            self.cache.max_memory_entries =
                raw.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "MARQUEE_CACHE_MAX_ENTRIES".to_string(),
                    value: raw.clone(),
                    reason: "must be a non-negative integer".to_string(),
                })?;
        }
        if let Some(path) = lookup("MARQUEE_CACHE_LMDB_PATH") {
            self.cache.lmdb_path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup("MARQUEE_PROBE_URL") {
            self.playback.probe_url = Some(url);
        }
        if let Some(filter) = lookup("MARQUEE_LOG") {
            self.logging.filter = filter;
        }
        if let Some(json) = lookup("MARQUEE_LOG_JSON") {
            self.logging.json = json == "1" || json.eq_ignore_ascii_case("true");
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.namespace.trim().is_empty() {
            return Err(invalid("cache.namespace", &self.cache.namespace, "must not be empty"));
        }
        if self.cache.max_memory_entries == 0 {
            return Err(invalid(
                "cache.max_memory_entries",
                &self.cache.max_memory_entries.to_string(),
                "must be > 0",
            ));
        }
        if self.cache.quota_evict_count == 0 {
            return Err(invalid(
                "cache.quota_evict_count",
                &self.cache.quota_evict_count.to_string(),
                "must be > 0",
            ));
        }
        if self.cache.cleanup_interval_secs == 0 {
            return Err(invalid(
                "cache.cleanup_interval_secs",
                &self.cache.cleanup_interval_secs.to_string(),
                "must be > 0",
            ));
        }
        if self.cache.lmdb_path.is_some() && self.cache.lmdb_max_size_mb == 0 {
            return Err(invalid(
                "cache.lmdb_max_size_mb",
                &self.cache.lmdb_max_size_mb.to_string(),
                "must be > 0 when lmdb_path is set",
            ));
        }

        let base_url = self.api.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(invalid("api.base_url", base_url, "must be an http(s) URL"));
        }
        for (field, value) in [
            ("api.search_timeout_ms", self.api.search_timeout_ms),
            ("api.info_timeout_ms", self.api.info_timeout_ms),
            ("api.sources_timeout_ms", self.api.sources_timeout_ms),
            ("api.subtitle_timeout_ms", self.api.subtitle_timeout_ms),
        ] {
            if value == 0 {
                return Err(invalid(field, &value.to_string(), "must be > 0"));
            }
        }

        if let Some(probe_url) = &self.playback.probe_url {
            if !(probe_url.starts_with("http://") || probe_url.starts_with("https://")) {
                return Err(invalid("playback.probe_url", probe_url, "must be an http(s) URL"));
            }
        }
        if self.playback.probe_interval_secs == 0 {
            return Err(invalid(
                "playback.probe_interval_secs",
                &self.playback.probe_interval_secs.to_string(),
                "must be > 0",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("MARQUEE_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
