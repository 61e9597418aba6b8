//! Media source and connection types.
//!
//! Pure data: ranking and selection policy lives in `marquee-playback`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// RESOLUTION PARSING
// ============================================================================

static PROGRESSIVE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)(\d{3,4})\s?[pi]").expect("Invalid progressive regex"));

static BARE_NUMBER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("Invalid bare number regex"));

static CODEC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:h\.?|x)\s?26[2-6]|hevc|avc1?|vp0?[89]|av1").expect("Invalid codec regex")
});

/// Heights accepted from a label without a `p`/`i` suffix.
const BARE_HEIGHTS: [u32; 11] = [144, 240, 360, 480, 540, 576, 720, 1080, 1440, 2160, 4320];

/// Parse a free-text quality label into a vertical resolution.
///
/// Recognizes `"1080p"`, `"720"`, `"1080p60"`, `"4K"`, `"UHD"`, `"Full HD"`
/// and similar. Anything else yields 0, which ranks below every known
/// resolution.
pub fn parse_resolution(label: &str) -> u32 {
    let label = label.trim().to_ascii_lowercase();
    if label.is_empty() {
        return 0;
    }
    let label = CODEC_PATTERN.replace_all(&label, " ");

    if let Some(res) = keyword_resolution(&label, &["8k"], 4320)
        .or_else(|| keyword_resolution(&label, &["4k", "uhd"], 2160))
        .or_else(|| keyword_resolution(&label, &["2k", "qhd"], 1440))
    {
        return res;
    }

    if let Some(res) = PROGRESSIVE_PATTERN
        .captures(&label)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
    {
        return res;
    }

    if let Some(res) = BARE_NUMBER_PATTERN
        .find_iter(&label)
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .find(|height| BARE_HEIGHTS.contains(height))
    {
        return res;
    }

    keyword_resolution(&label, &["fhd", "full hd", "fullhd"], 1080)
        .or_else(|| keyword_resolution(&label, &["hd"], 720))
        .or_else(|| keyword_resolution(&label, &["sd"], 480))
        .unwrap_or(0)
}

fn keyword_resolution(label: &str, keywords: &[&str], resolution: u32) -> Option<u32> {
    let words: Vec<&str> = label
        .split(|c: char| !c.is_ascii_alphanumeric() && c != ' ')
        .flat_map(|part| {
            // keep multi-word keywords ("full hd") matchable as a whole
            std::iter::once(part.trim()).chain(part.split_whitespace())
        })
        .collect();
    keywords
        .iter()
        .any(|kw| words.iter().any(|w| w == kw))
        .then_some(resolution)
}

// ============================================================================
// FORMAT / MIME
// ============================================================================

/// Container/stream format of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaFormat {
    Mp4,
    WebM,
    Hls,
    Dash,
    Matroska,
    Ogg,
    QuickTime,
    Avi,
    Unknown,
}

impl MediaFormat {
    /// Resolve a short format tag (`"mp4"`, `".m3u8"`, `"video/webm"`).
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim().to_ascii_lowercase();
        let tag = tag.rsplit('/').next().unwrap_or("");
        match tag.trim_start_matches('.') {
            "mp4" | "m4v" => Self::Mp4,
            "webm" => Self::WebM,
            "m3u8" | "hls" | "x-mpegurl" => Self::Hls,
            "mpd" | "dash" | "dash+xml" => Self::Dash,
            "mkv" | "matroska" | "x-matroska" => Self::Matroska,
            "ogg" | "ogv" => Self::Ogg,
            "mov" | "quicktime" => Self::QuickTime,
            "avi" | "x-msvideo" => Self::Avi,
            _ => Self::Unknown,
        }
    }

    /// Guess the format from a URL's path extension.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file = path.rsplit('/').next().unwrap_or(path);
        match file.rsplit_once('.') {
            Some((_, ext)) => Self::from_tag(ext),
            None => Self::Unknown,
        }
    }

    /// MIME type handed to the media element.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp4 | Self::Unknown => "video/mp4",
            Self::WebM => "video/webm",
            Self::Hls => "application/x-mpegURL",
            Self::Dash => "application/dash+xml",
            Self::Matroska => "video/x-matroska",
            Self::Ogg => "video/ogg",
            Self::QuickTime => "video/quicktime",
            Self::Avi => "video/x-msvideo",
        }
    }

    /// Whether a browser media element can play this progressively.
    pub fn is_streamable(&self) -> bool {
        matches!(
            self,
            Self::Mp4 | Self::WebM | Self::Hls | Self::Dash | Self::Ogg
        )
    }
}

// ============================================================================
// SOURCE CANDIDATE
// ============================================================================

/// One playable URL/quality/format tuple offered for a title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCandidate {
    pub url: String,
    pub quality_label: String,
    pub format: String,
    pub size_bytes: Option<u64>,
}

impl SourceCandidate {
    pub fn new(
        url: impl Into<String>,
        quality_label: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            quality_label: quality_label.into(),
            format: format.into(),
            size_bytes: None,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    /// Parsed vertical resolution; 0 when the label is missing or unparseable.
    pub fn resolution(&self) -> u32 {
        parse_resolution(&self.quality_label)
    }

    /// Format from the tag, falling back to the URL extension.
    pub fn media_format(&self) -> MediaFormat {
        match MediaFormat::from_tag(&self.format) {
            MediaFormat::Unknown => MediaFormat::from_url(&self.url),
            known => known,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        self.media_format().mime_type()
    }

    pub fn is_streamable(&self) -> bool {
        self.media_format().is_streamable()
    }
}

// ============================================================================
// CONNECTION ESTIMATE
// ============================================================================

/// Coarse bandwidth bucket derived from measured speed and latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityTier {
    /// Highest resolution this tier sustains without rebuffering.
    pub fn ceiling(&self) -> u32 {
        match self {
            Self::Excellent => 1080,
            Self::Good => 720,
            Self::Fair => 480,
            Self::Poor => 360,
        }
    }

    /// Bucket a measurement.
    pub fn from_measurement(speed_mbps: f64, latency_ms: f64) -> Self {
        if speed_mbps >= 10.0 && latency_ms < 100.0 {
            Self::Excellent
        } else if speed_mbps >= 5.0 && latency_ms < 200.0 {
            Self::Good
        } else if speed_mbps >= 2.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest measured network capability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEstimate {
    pub speed_mbps: f64,
    pub latency_ms: f64,
    pub quality_tier: QualityTier,
}

impl ConnectionEstimate {
    /// Build an estimate, deriving the quality tier from the measurement.
    pub fn new(speed_mbps: f64, latency_ms: f64) -> Self {
        Self {
            speed_mbps,
            latency_ms,
            quality_tier: QualityTier::from_measurement(speed_mbps, latency_ms),
        }
    }

    /// A zero or non-finite speed carries no information.
    pub fn is_usable(&self) -> bool {
        self.speed_mbps.is_finite() && self.speed_mbps > 0.0
    }
}
