//! Marquee API
//!
//! Typed access to the upstream movie/series catalog: the response
//! schema, an HTTP client with per-endpoint timeouts, and a cache-wrapped
//! catalog that serves stale data when the upstream is unavailable.

pub mod cached;
pub mod client;
pub mod error;
pub mod types;

pub use cached::{info_key, search_key, sources_key, CachedCatalog, CatalogTtls};
pub use client::{CatalogApi, EndpointTimeouts, HttpCatalogClient};
pub use error::ApiClientError;
pub use types::{
    EpisodeInfo, MediaKind, RawSource, SearchResponse, SearchResult, SourcesResponse,
    SubtitleInfo, TitleInfo,
};
