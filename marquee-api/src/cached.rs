//! Catalog access through the tiered cache.
//!
//! Each endpoint has its own key scheme and TTL:
//!
//! | endpoint | key                                   | TTL    |
//! |----------|---------------------------------------|--------|
//! | search   | `search:<query>`                      | 5 min  |
//! | info     | `info:<id>`                           | 1 h    |
//! | sources  | `sources:<id>:<season>:<episode>`     | 10 min |
//!
//! Absent season/episode numbers are keyed as `0`.

use std::sync::Arc;
use std::time::Duration;

use marquee_core::{ApiSettings, FetchError};
use marquee_storage::{CacheRead, TieredCache};

use crate::client::CatalogApi;
use crate::types::{SearchResponse, SourcesResponse, TitleInfo};

/// Per-endpoint cache lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogTtls {
    pub search: Duration,
    pub info: Duration,
    pub sources: Duration,
}

impl Default for CatalogTtls {
    fn default() -> Self {
        Self::from(&ApiSettings::default())
    }
}

impl From<&ApiSettings> for CatalogTtls {
    fn from(settings: &ApiSettings) -> Self {
        Self {
            search: settings.search_ttl(),
            info: settings.info_ttl(),
            sources: settings.sources_ttl(),
        }
    }
}

pub fn search_key(query: &str) -> String {
    format!("search:{}", query.trim().to_lowercase())
}

pub fn info_key(id: &str) -> String {
    format!("info:{id}")
}

pub fn sources_key(id: &str, season: Option<u32>, episode: Option<u32>) -> String {
    format!(
        "sources:{}:{}:{}",
        id,
        season.unwrap_or(0),
        episode.unwrap_or(0)
    )
}

/// A [`CatalogApi`] wrapped with read-through caching and stale fallback.
pub struct CachedCatalog<A: CatalogApi> {
    api: A,
    cache: Arc<TieredCache>,
    ttls: CatalogTtls,
}

impl<A: CatalogApi> CachedCatalog<A> {
    pub fn new(api: A, cache: Arc<TieredCache>, ttls: CatalogTtls) -> Self {
        Self { api, cache, ttls }
    }

    pub fn with_defaults(api: A, cache: Arc<TieredCache>) -> Self {
        Self::new(api, cache, CatalogTtls::default())
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn ttls(&self) -> CatalogTtls {
        self.ttls
    }

    pub async fn search(&self, query: &str) -> Result<CacheRead<SearchResponse>, FetchError> {
        self.cache
            .get_or_fetch(&search_key(query), self.ttls.search, || self.api.search(query))
            .await
    }

    pub async fn get_info(&self, id: &str) -> Result<CacheRead<TitleInfo>, FetchError> {
        self.cache
            .get_or_fetch(&info_key(id), self.ttls.info, || self.api.get_info(id))
            .await
    }

    pub async fn get_sources(
        &self,
        id: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<CacheRead<SourcesResponse>, FetchError> {
        self.cache
            .get_or_fetch(&sources_key(id, season, episode), self.ttls.sources, || {
                self.api.get_sources(id, season, episode)
            })
            .await
    }

    /// Drop every cached response for a title.
    pub fn invalidate_title(&self, id: &str) {
        self.cache.remove(&info_key(id));
        self.cache.clear(&format!("sources:{id}:"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use marquee_core::{CaptionError, ManualClock};
    use marquee_storage::{CacheConfig, MemoryStore, ReadOrigin};
    use rstest::rstest;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct StubCatalog {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    impl StubCatalog {
        fn check(&self, endpoint: &str) -> Result<(), FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(FetchError::Status {
                    endpoint: endpoint.to_string(),
                    status: 502,
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CatalogApi for StubCatalog {
        async fn search(&self, query: &str) -> Result<SearchResponse, FetchError> {
            self.check("search")?;
            serde_json::from_value(serde_json::json!({
                "results": [{"id": "m-1", "title": query}]
            }))
            .map_err(|e| FetchError::InvalidResponse {
                endpoint: "search".to_string(),
                reason: e.to_string(),
            })
        }

        async fn get_info(&self, id: &str) -> Result<TitleInfo, FetchError> {
            self.check("info")?;
            Ok(TitleInfo {
                id: id.to_string(),
                title: "Heat".to_string(),
                kind: crate::types::MediaKind::Movie,
                description: None,
                release_date: None,
                genres: vec![],
                duration: None,
                image: None,
                episodes: vec![],
            })
        }

        async fn get_sources(
            &self,
            _id: &str,
            _season: Option<u32>,
            _episode: Option<u32>,
        ) -> Result<SourcesResponse, FetchError> {
            self.check("sources")?;
            Ok(SourcesResponse::default())
        }

        async fn fetch_subtitles(&self, url: &str) -> Result<String, CaptionError> {
            Err(CaptionError::Fetch {
                url: url.to_string(),
                reason: "stub".to_string(),
            })
        }
    }

    fn catalog() -> (CachedCatalog<StubCatalog>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = TieredCache::new(Arc::new(MemoryStore::new()), CacheConfig::new())
            .with_clock(clock.clone());
        (
            CachedCatalog::with_defaults(StubCatalog::default(), Arc::new(cache)),
            clock,
        )
    }

    #[rstest]
    #[case("Dune", "search:dune")]
    #[case("  The Thing ", "search:the thing")]
    fn test_search_key(#[case] query: &str, #[case] expected: &str) {
        assert_eq!(search_key(query), expected);
    }

    #[rstest]
    #[case(None, None, "sources:tv-9:0:0")]
    #[case(Some(2), Some(5), "sources:tv-9:2:5")]
    #[case(Some(1), None, "sources:tv-9:1:0")]
    fn test_sources_key(#[case] season: Option<u32>, #[case] episode: Option<u32>, #[case] expected: &str) {
        assert_eq!(sources_key("tv-9", season, episode), expected);
    }

    #[tokio::test]
    async fn test_search_is_cached_for_ttl() {
        let (catalog, clock) = catalog();

        let first = catalog.search("Dune").await.expect("search should succeed");
        assert_eq!(first.origin(), ReadOrigin::Source);
        let second = catalog.search("dune").await.expect("search should succeed");
        assert_eq!(second.origin(), ReadOrigin::Memory);
        assert_eq!(catalog.api().calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(5 * 60));
        catalog.search("dune").await.expect("search should succeed");
        assert_eq!(catalog.api().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_upstream_failure_serves_stale_info() {
        let (catalog, clock) = catalog();
        catalog.get_info("m-1").await.expect("info should succeed");

        clock.advance(Duration::from_secs(2 * 3600));
        catalog.api().failing.store(true, Ordering::SeqCst);

        let read = catalog.get_info("m-1").await.expect("stale info should be served");
        assert!(read.is_stale());
        assert_eq!(read.value().title, "Heat");
    }

    #[tokio::test]
    async fn test_upstream_failure_without_cache_is_an_error() {
        let (catalog, _clock) = catalog();
        catalog.api().failing.store(true, Ordering::SeqCst);

        let err = catalog.get_sources("tv-9", Some(1), Some(1)).await.expect_err("no fallback");
        assert_eq!(err.endpoint(), "sources");
    }

    #[tokio::test]
    async fn test_invalidate_title() {
        let (catalog, _clock) = catalog();
        catalog.get_info("tv-9").await.expect("info should succeed");
        catalog.get_sources("tv-9", Some(1), Some(1)).await.expect("sources should succeed");
        catalog.invalidate_title("tv-9");

        assert!(catalog.cache().get_stale_entry(&info_key("tv-9")).is_none());
        assert!(catalog.cache().get_stale_entry(&sources_key("tv-9", Some(1), Some(1))).is_none());
    }
}
