//! HTTP catalog client.

use std::time::Duration;

use async_trait::async_trait;
use marquee_core::{ApiSettings, CaptionError, FetchError};
use serde::de::DeserializeOwned;

use crate::error::ApiClientError;
use crate::types::{SearchResponse, SourcesResponse, TitleInfo};

/// Upstream catalog operations.
///
/// Every failure (network, timeout, non-2xx, undecodable body) is a
/// [`FetchError`]; callers fall back to stale cache data on any of them.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResponse, FetchError>;

    async fn get_info(&self, id: &str) -> Result<TitleInfo, FetchError>;

    async fn get_sources(
        &self,
        id: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<SourcesResponse, FetchError>;

    /// Raw subtitle document at `url`.
    async fn fetch_subtitles(&self, url: &str) -> Result<String, CaptionError>;
}

/// Per-endpoint request deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointTimeouts {
    pub search: Duration,
    pub info: Duration,
    pub sources: Duration,
    pub subtitles: Duration,
}

impl From<&ApiSettings> for EndpointTimeouts {
    fn from(settings: &ApiSettings) -> Self {
        Self {
            search: settings.search_timeout(),
            info: settings.info_timeout(),
            sources: settings.sources_timeout(),
            subtitles: settings.subtitle_timeout(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    client: reqwest::Client,
    base_url: String,
    timeouts: EndpointTimeouts,
}

impl HttpCatalogClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiClientError> {
        let base_url = settings.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiClientError::Config("api.base_url is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("marquee/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            timeouts: EndpointTimeouts::from(settings),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeouts(&self) -> EndpointTimeouts {
        self.timeouts
    }

    pub fn search_url(&self) -> String {
        format!("{}/search", self.base_url)
    }

    pub fn info_url(&self, id: &str) -> String {
        format!("{}/info/{}", self.base_url, urlencoding::encode(id))
    }

    pub fn sources_url(&self, id: &str) -> String {
        format!("{}/sources/{}", self.base_url, urlencoding::encode(id))
    }

    async fn get_json<T, Q>(
        &self,
        url: String,
        query: &Q,
        timeout: Duration,
    ) -> Result<T, ApiClientError>
    where
        T: DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        let request = self.client.get(url).query(query).send();
        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| ApiClientError::Timeout(timeout))??;

        let body = tokio::time::timeout(timeout, parse_response(response))
            .await
            .map_err(|_| ApiClientError::Timeout(timeout))??;
        Ok(serde_json::from_str(&body)?)
    }
}

async fn parse_response(response: reqwest::Response) -> Result<String, ApiClientError> {
    let status = response.status();
    let text = response.text().await?;
    if status.is_success() {
        Ok(text)
    } else {
        Err(ApiClientError::Status {
            status: status.as_u16(),
            body: text,
        })
    }
}

#[async_trait]
impl CatalogApi for HttpCatalogClient {
    async fn search(&self, query: &str) -> Result<SearchResponse, FetchError> {
        tracing::debug!(query = %query, "Catalog search");
        self.get_json(self.search_url(), &[("query", query)], self.timeouts.search)
            .await
            .map_err(|e| e.into_fetch_error("search"))
    }

    async fn get_info(&self, id: &str) -> Result<TitleInfo, FetchError> {
        self.get_json::<TitleInfo, [(&str, &str)]>(self.info_url(id), &[], self.timeouts.info)
            .await
            .map_err(|e| e.into_fetch_error("info"))
    }

    async fn get_sources(
        &self,
        id: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<SourcesResponse, FetchError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(season) = season {
            query.push(("season", season.to_string()));
        }
        if let Some(episode) = episode {
            query.push(("episode", episode.to_string()));
        }

        self.get_json(self.sources_url(id), &query, self.timeouts.sources)
            .await
            .map_err(|e| e.into_fetch_error("sources"))
    }

    async fn fetch_subtitles(&self, url: &str) -> Result<String, CaptionError> {
        let to_caption_error = |reason: String| CaptionError::Fetch {
            url: url.to_string(),
            reason,
        };

        let timeout = self.timeouts.subtitles;
        let response = tokio::time::timeout(timeout, self.client.get(url).send())
            .await
            .map_err(|_| to_caption_error(format!("timed out after {timeout:?}")))?
            .map_err(|e| to_caption_error(e.to_string()))?;

        let body = tokio::time::timeout(timeout, parse_response(response))
            .await
            .map_err(|_| to_caption_error(format!("timed out after {timeout:?}")))?
            .map_err(|e| to_caption_error(e.to_string()))?;

        if body.trim().is_empty() {
            return Err(CaptionError::EmptyDocument);
        }
        Ok(body)
    }
}
