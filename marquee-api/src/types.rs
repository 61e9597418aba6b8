//! Response schema for the catalog API.
//!
//! Optional upstream fields are defaulted here, once, so nothing past
//! this module has to probe for missing keys.

use marquee_core::SourceCandidate;
use serde::{Deserialize, Serialize};

/// Movie or series, as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaKind {
    Movie,
    Series,
    #[default]
    Unknown,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_series(&self) -> bool {
        matches!(self, Self::Series)
    }
}

impl From<String> for MediaKind {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "movie" | "film" => Self::Movie,
            "series" | "tv" | "tv series" | "tv_series" | "show" => Self::Series,
            _ => Self::Unknown,
        }
    }
}

impl From<MediaKind> for String {
    fn from(kind: MediaKind) -> Self {
        kind.as_str().to_string()
    }
}

// ============================================================================
// SEARCH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    #[serde(default, rename = "type")]
    pub kind: MediaKind,
    #[serde(default)]
    pub release_year: Option<u32>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default = "first_page")]
    pub current_page: u32,
    #[serde(default)]
    pub has_next_page: bool,
}

fn first_page() -> u32 {
    1
}

// ============================================================================
// INFO
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeInfo {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleInfo {
    pub id: String,
    pub title: String,
    #[serde(default, rename = "type")]
    pub kind: MediaKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub episodes: Vec<EpisodeInfo>,
}

impl TitleInfo {
    /// Episodes of one season, in listing order.
    pub fn season_episodes(&self, season: u32) -> impl Iterator<Item = &EpisodeInfo> {
        self.episodes
            .iter()
            .filter(move |episode| episode.season == Some(season))
    }

    /// Distinct season numbers, ascending.
    pub fn seasons(&self) -> Vec<u32> {
        let mut seasons: Vec<u32> = self.episodes.iter().filter_map(|e| e.season).collect();
        seasons.sort_unstable();
        seasons.dedup();
        seasons
    }
}

// ============================================================================
// SOURCES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSource {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default, rename = "isM3U8")]
    pub is_m3u8: bool,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleInfo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourcesResponse {
    #[serde(default)]
    pub sources: Vec<RawSource>,
    #[serde(default)]
    pub subtitles: Vec<SubtitleInfo>,
}

impl SourcesResponse {
    /// Playable candidates in upstream order. Sources without a URL are
    /// dropped; a missing quality label becomes `"unknown"`.
    pub fn candidates(&self) -> Vec<SourceCandidate> {
        self.sources
            .iter()
            .filter_map(|source| {
                let url = source.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
                let label = source
                    .quality
                    .as_deref()
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .unwrap_or("unknown");
                let format = match (&source.format, source.is_m3u8) {
                    (Some(format), _) if !format.trim().is_empty() => format.trim(),
                    (_, true) => "m3u8",
                    _ => "",
                };
                let mut candidate = SourceCandidate::new(url, label, format);
                candidate.size_bytes = source.size;
                Some(candidate)
            })
            .collect()
    }

    /// Subtitle tracks that have a URL, as `(url, language)`.
    pub fn subtitle_tracks(&self) -> Vec<(String, String)> {
        self.subtitles
            .iter()
            .filter_map(|sub| {
                let url = sub.url.clone().filter(|u| !u.trim().is_empty())?;
                let lang = sub.lang.clone().unwrap_or_else(|| "Unknown".to_string());
                Some((url, lang))
            })
            .collect()
    }
}
