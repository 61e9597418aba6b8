//! Marquee Test Utilities
//!
//! Shared test infrastructure for the Marquee workspace:
//! - Scriptable persistent store and catalog mocks
//! - Proptest generators for source candidates, estimates and cache data
//! - Fixtures for a clock-driven cache and sample catalog responses
//! - Assertions for cache freshness and playback actions

pub use marquee_core::{
    CaptionError, Clock, ConnectionEstimate, FetchError, ManualClock, QualityTier,
    SourceCandidate, StorageError, Timestamp,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use marquee_api::{CatalogApi, SearchResponse, SourcesResponse, TitleInfo};
use marquee_storage::{MemoryStore, PersistentStore};

// ============================================================================
// MOCK PERSISTENT STORE
// ============================================================================

/// [`MemoryStore`] wrapper that fails writes on command.
///
/// `fail_next_writes(n)` makes the next `n` `set` calls report
/// `QuotaExceeded` without touching the data; `set_unavailable(true)` makes
/// every operation fail as if storage were switched off.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing_writes: AtomicUsize,
    unavailable: AtomicBool,
    write_attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every `set` call so far, including rejected ones.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "storage disabled".to_string(),
            });
        }
        Ok(())
    }
}

impl PersistentStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let scripted_failure = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
            });
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        self.check_available()?;
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.check_available()?;
        self.inner.keys()
    }
}

// ============================================================================
// MOCK CATALOG
// ============================================================================

/// In-memory [`CatalogApi`] with per-endpoint call counters.
///
/// Unknown ids answer 404. `set_failing(true)` turns every call into a 503
/// so stale-fallback paths can be exercised.
#[derive(Debug, Default)]
pub struct MockCatalog {
    searches: Mutex<HashMap<String, SearchResponse>>,
    titles: Mutex<HashMap<String, TitleInfo>>,
    sources: Mutex<HashMap<String, SourcesResponse>>,
    subtitles: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(self, query: &str, response: SearchResponse) -> Self {
        lock(&self.searches).insert(query.to_lowercase(), response);
        self
    }

    pub fn with_title(self, info: TitleInfo) -> Self {
        lock(&self.titles).insert(info.id.clone(), info);
        self
    }

    pub fn with_sources(self, id: &str, response: SourcesResponse) -> Self {
        lock(&self.sources).insert(id.to_string(), response);
        self
    }

    pub fn with_subtitles(self, url: &str, body: &str) -> Self {
        lock(&self.subtitles).insert(url.to_string(), body.to_string());
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Calls made to `endpoint` (`"search"`, `"info"`, `"sources"`,
    /// `"subtitles"`).
    pub fn calls(&self, endpoint: &str) -> usize {
        lock(&self.calls).get(endpoint).copied().unwrap_or(0)
    }

    fn record(&self, endpoint: &'static str) -> Result<(), FetchError> {
        *lock(&self.calls).entry(endpoint).or_default() += 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Status {
                endpoint: endpoint.to_string(),
                status: 503,
            });
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn not_found(endpoint: &str) -> FetchError {
    FetchError::Status {
        endpoint: endpoint.to_string(),
        status: 404,
    }
}

#[async_trait]
impl CatalogApi for MockCatalog {
    async fn search(&self, query: &str) -> Result<SearchResponse, FetchError> {
        self.record("search")?;
        Ok(lock(&self.searches)
            .get(&query.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn get_info(&self, id: &str) -> Result<TitleInfo, FetchError> {
        self.record("info")?;
        lock(&self.titles).get(id).cloned().ok_or_else(|| not_found("info"))
    }

    async fn get_sources(
        &self,
        id: &str,
        _season: Option<u32>,
        _episode: Option<u32>,
    ) -> Result<SourcesResponse, FetchError> {
        self.record("sources")?;
        lock(&self.sources).get(id).cloned().ok_or_else(|| not_found("sources"))
    }

    async fn fetch_subtitles(&self, url: &str) -> Result<String, CaptionError> {
        self.record("subtitles").map_err(|e| CaptionError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        lock(&self.subtitles)
            .get(url)
            .cloned()
            .ok_or_else(|| CaptionError::Fetch {
                url: url.to_string(),
                reason: "HTTP 404".to_string(),
            })
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Marquee data.

    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    /// Quality labels as they appear upstream, including unparseable ones.
    pub fn arb_quality_label() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("1080p".to_string()),
            Just("720p".to_string()),
            Just("480p".to_string()),
            Just("360p".to_string()),
            Just("4K".to_string()),
            Just("2K".to_string()),
            Just("auto".to_string()),
            Just(String::new()),
            (144u32..2160).prop_map(|res| format!("{res}p")),
        ]
    }

    pub fn arb_format_tag() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("mp4".to_string()),
            Just("m3u8".to_string()),
            Just("webm".to_string()),
            Just("mkv".to_string()),
            Just(String::new()),
        ]
    }

    pub fn arb_source_candidate() -> impl Strategy<Value = SourceCandidate> {
        (
            "[a-z0-9]{4,12}",
            arb_quality_label(),
            arb_format_tag(),
            proptest::option::of(1u64..5_000_000_000),
        )
            .prop_map(|(slug, label, format, size)| SourceCandidate {
                url: format!("https://cdn.example/{slug}"),
                quality_label: label,
                format,
                size_bytes: size,
            })
    }

    pub fn arb_candidates(max: usize) -> impl Strategy<Value = Vec<SourceCandidate>> {
        prop::collection::vec(arb_source_candidate(), 1..=max.max(1))
    }

    pub fn arb_connection_estimate() -> impl Strategy<Value = ConnectionEstimate> {
        (0.0f64..100.0, 1.0f64..1000.0)
            .prop_map(|(speed, latency)| ConnectionEstimate::new(speed, latency))
    }

    pub fn arb_quality_tier() -> impl Strategy<Value = QualityTier> {
        prop_oneof![
            Just(QualityTier::Excellent),
            Just(QualityTier::Good),
            Just(QualityTier::Fair),
            Just(QualityTier::Poor),
        ]
    }

    /// Cache keys shaped like the catalog's key scheme.
    pub fn arb_cache_key() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z ]{1,16}".prop_map(|q| format!("search:{q}")),
            "[a-z0-9-]{1,12}".prop_map(|id| format!("info:{id}")),
            ("[a-z0-9-]{1,12}", 0u32..10, 0u32..30)
                .prop_map(|(id, s, e)| format!("sources:{id}:{s}:{e}")),
        ]
    }

    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        (1u64..86_400).prop_map(Duration::from_secs)
    }

    pub fn arb_json_value() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            any::<i64>().prop_map(serde_json::Value::from),
            any::<bool>().prop_map(serde_json::Value::from),
            "[ -~]{0,32}".prop_map(serde_json::Value::from),
            ("[a-z]{1,8}", "[ -~]{0,16}")
                .prop_map(|(k, v)| serde_json::json!({ k: v })),
        ]
    }

    /// SRT documents of 1 to 20 cues with `\n` or `\r\n` line endings.
    pub fn arb_srt_document() -> impl Strategy<Value = String> {
        (
            prop::collection::vec("[A-Za-z ,.!?]{1,40}", 1..20),
            any::<bool>(),
        )
            .prop_map(|(lines, crlf)| {
                let eol = if crlf { "\r\n" } else { "\n" };
                lines
                    .iter()
                    .enumerate()
                    .map(|(i, text)| {
                        let start = i * 4;
                        format!(
                            "{}{eol}00:{:02}:{:02},{:03} --> 00:{:02}:{:02},{:03}{eol}{text}{eol}",
                            i + 1,
                            start / 60,
                            start % 60,
                            (i * 37) % 1000,
                            (start + 3) / 60,
                            (start + 3) % 60,
                            (i * 91) % 1000,
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(eol)
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common test scenarios.

    use super::*;
    use chrono::{TimeZone, Utc};
    use marquee_storage::{CacheConfig, TieredCache};

    /// Fixed start time for clock-driven tests.
    pub fn epoch() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// A cache over a [`FlakyStore`] with a manual clock.
    pub struct CacheFixture {
        pub cache: Arc<TieredCache>,
        pub clock: Arc<ManualClock>,
        pub store: Arc<FlakyStore>,
    }

    impl CacheFixture {
        pub fn new() -> Self {
            Self::with_config(CacheConfig::new())
        }

        pub fn with_config(config: CacheConfig) -> Self {
            let clock = Arc::new(ManualClock::new(epoch()));
            let store = Arc::new(FlakyStore::new());
            let cache = TieredCache::new(store.clone(), config).with_clock(clock.clone());
            Self {
                cache: Arc::new(cache),
                clock,
                store,
            }
        }
    }

    impl Default for CacheFixture {
        fn default() -> Self {
            Self::new()
        }
    }

    pub fn sample_title(id: &str) -> TitleInfo {
        TitleInfo {
            id: id.to_string(),
            title: "Heat".to_string(),
            kind: marquee_api::MediaKind::Movie,
            description: Some("A group of career criminals is tracked by a detective.".to_string()),
            release_date: Some("1995-12-15".to_string()),
            genres: vec!["Crime".to_string(), "Drama".to_string()],
            duration: Some("170 min".to_string()),
            image: None,
            episodes: vec![],
        }
    }

    /// Three HLS/MP4 sources and one English subtitle track.
    pub fn sample_sources() -> SourcesResponse {
        serde_json::from_value(serde_json::json!({
            "sources": [
                {"url": "https://cdn.example/heat/480/index.m3u8", "quality": "480p", "isM3U8": true},
                {"url": "https://cdn.example/heat/1080.mp4", "quality": "1080p", "format": "mp4"},
                {"url": "https://cdn.example/heat/720/index.m3u8", "quality": "720p", "isM3U8": true}
            ],
            "subtitles": [{"url": "https://cdn.example/heat/en.srt", "lang": "English"}]
        }))
        .unwrap_or_default()
    }

    pub fn sample_srt() -> &'static str {
        "1\n00:00:01,000 --> 00:00:02,500\nHello\n\n2\n00:00:03,000 --> 00:00:04,000\nAgain\n"
    }

    /// A catalog pre-loaded with [`sample_title`], [`sample_sources`] and
    /// [`sample_srt`] under `id`.
    pub fn sample_catalog(id: &str) -> MockCatalog {
        MockCatalog::new()
            .with_title(sample_title(id))
            .with_sources(id, sample_sources())
            .with_subtitles("https://cdn.example/heat/en.srt", sample_srt())
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for cache and playback behavior.

    use marquee_playback::{MediaSource, SessionAction};
    use marquee_storage::TieredCache;

    /// Assert that `key` reads fresh.
    #[track_caller]
    pub fn assert_fresh(cache: &TieredCache, key: &str) {
        assert!(
            cache.get_entry(key).is_some(),
            "Expected fresh entry for {key}"
        );
    }

    /// Assert that `key` is expired but still available for fallback.
    #[track_caller]
    pub fn assert_stale_only(cache: &TieredCache, key: &str) {
        assert!(cache.get_entry(key).is_none(), "Expected {key} to be expired");
        assert!(
            cache.get_stale_entry(key).is_some(),
            "Expected stale entry for {key}"
        );
    }

    /// Assert that an action loads a source and return it.
    #[track_caller]
    pub fn assert_load(action: &SessionAction) -> &MediaSource {
        match action {
            SessionAction::Load(source) => source,
            other => panic!("Expected Load action, got: {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_api::CachedCatalog;
    use marquee_playback::{PlaybackSession, SessionOptions};
    use marquee_storage::{CacheConfig, SetOutcome};
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_quota_eviction_round_trip() {
        let fixture = fixtures::CacheFixture::with_config(CacheConfig::new().with_quota_evict_count(5));
        let ttl = Duration::from_secs(600);

        for i in 0..8 {
            let outcome = fixture.cache.set(&format!("info:{i}"), &json!({"n": i}), ttl);
            assert!(outcome.is_persisted());
            fixture.clock.advance(Duration::from_secs(1));
        }

        fixture.store.fail_next_writes(1);
        let attempts_before = fixture.store.write_attempts();
        let outcome = fixture.cache.set("info:new", &json!({"n": "new"}), ttl);

        assert_eq!(outcome, SetOutcome::Persisted { evicted: 5 });
        assert_eq!(fixture.store.write_attempts() - attempts_before, 2);
        assert_eq!(fixture.store.inner().len(), 4);
        for i in 0..5 {
            assert!(fixture
                .store
                .get(&format!("marquee:info:{i}"))
                .expect("get should succeed")
                .is_none());
        }
        assertions::assert_fresh(&fixture.cache, "info:new");
    }

    #[test]
    fn test_unavailable_store_degrades_to_memory() {
        let fixture = fixtures::CacheFixture::new();
        fixture.store.set_unavailable(true);

        let outcome = fixture.cache.set("info:1", &json!({"title": "Heat"}), Duration::from_secs(60));
        assert!(!outcome.is_persisted());
        assert!(outcome.is_cached());
        assertions::assert_fresh(&fixture.cache, "info:1");

        fixture.clock.advance(Duration::from_secs(61));
        assertions::assert_stale_only(&fixture.cache, "info:1");
    }

    #[tokio::test]
    async fn test_mock_catalog_feeds_cached_catalog() {
        let fixture = fixtures::CacheFixture::new();
        let catalog = CachedCatalog::with_defaults(fixtures::sample_catalog("heat-1995"), fixture.cache.clone());

        let sources = catalog
            .get_sources("heat-1995", None, None)
            .await
            .expect("sources should load");
        catalog
            .get_sources("heat-1995", None, None)
            .await
            .expect("sources should load");
        assert_eq!(catalog.api().calls("sources"), 1);

        let candidates = sources.value().candidates();
        let mut session = PlaybackSession::new(&candidates, None, SessionOptions::default())
            .expect("session should build");
        let action = session.start().expect("start should succeed");
        let source = assertions::assert_load(&action);
        assert_eq!(source.url, "https://cdn.example/heat/1080.mp4");

        let missing = catalog.get_info("nope").await.expect_err("unknown id");
        assert_eq!(missing, not_found("info"));
    }

    #[tokio::test]
    async fn test_mock_catalog_subtitles() {
        let catalog = fixtures::sample_catalog("heat-1995");
        let body = catalog
            .fetch_subtitles("https://cdn.example/heat/en.srt")
            .await
            .expect("subtitles should load");
        assert!(body.contains("-->"));

        catalog.set_failing(true);
        assert!(catalog.fetch_subtitles("https://cdn.example/heat/en.srt").await.is_err());
        assert_eq!(catalog.calls("subtitles"), 2);
    }

    proptest! {
        #[test]
        fn prop_generated_srt_converts_cleanly(doc in generators::arb_srt_document()) {
            let vtt = marquee_playback::srt_to_webvtt(&doc);
            prop_assert!(vtt.starts_with("WEBVTT\n\n"));
            prop_assert!(!vtt.contains('\r'));
            for line in vtt.lines().filter(|l| l.contains("-->")) {
                prop_assert!(!line.contains(','), "timing line kept a comma: {}", line);
            }
        }

        #[test]
        fn prop_session_start_is_in_bounds(
            candidates in generators::arb_candidates(8),
            estimate in proptest::option::of(generators::arb_connection_estimate()),
        ) {
            let session = PlaybackSession::new(&candidates, estimate, SessionOptions::default())
                .expect("non-empty candidates should build");
            prop_assert!(session.current_index() < candidates.len());
        }

        #[test]
        fn prop_set_then_get_returns_value(
            key in generators::arb_cache_key(),
            value in generators::arb_json_value(),
            ttl in generators::arb_ttl(),
        ) {
            let fixture = fixtures::CacheFixture::new();
            fixture.cache.set(&key, &value, ttl);
            prop_assert_eq!(fixture.cache.get::<serde_json::Value>(&key), Some(value));
        }
    }
}
