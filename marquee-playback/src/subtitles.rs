//! Subtitle conversion to WebVTT.

use std::borrow::Cow;

use marquee_core::CaptionError;
use once_cell::sync::Lazy;
use regex::Regex;

static SRT_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+:\d{2}:\d{2}),(\d{3})").expect("Invalid SRT timestamp regex"));

static SRT_CUE_TIMING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*\d+:\d{2}:\d{2},\d{3}\s*-->").expect("Invalid SRT cue timing regex")
});

const WEBVTT_HEADER: &str = "WEBVTT";
const CUE_ARROW: &str = "-->";

/// Convert an SRT document to WebVTT.
///
/// Strips a byte-order mark, normalizes line endings to `\n`, drops numeric
/// cue index lines (a digits-only line followed by a timing line) and
/// rewrites the millisecond separator on timing lines. A document already
/// starting with `WEBVTT` is returned with only the first two steps applied.
pub fn srt_to_webvtt(input: &str) -> String {
    let text = normalize_line_endings(input.strip_prefix('\u{feff}').unwrap_or(input));
    if text.trim_start().starts_with(WEBVTT_HEADER) {
        return text.into_owned();
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let mut body: Vec<Cow<'_, str>> = Vec::with_capacity(lines.len());

    for (i, &line) in lines.iter().enumerate() {
        let next_is_timing = lines.get(i + 1).is_some_and(|next| next.contains(CUE_ARROW));
        if next_is_timing && is_cue_index(line) {
            continue;
        }

        if line.contains(CUE_ARROW) {
            body.push(SRT_TIMESTAMP.replace_all(line, "$1.$2"));
        } else {
            body.push(Cow::Borrowed(line));
        }
    }

    let body = body.join("\n");
    format!("{WEBVTT_HEADER}\n\n{}", body.trim_start_matches('\n'))
}

fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

fn is_cue_index(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit())
}

/// Subtitle document format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CaptionFormat {
    WebVtt,
    Srt,
}

impl CaptionFormat {
    /// Detect from the document body first, then the URL extension.
    pub fn detect(url: &str, body: &str) -> Option<Self> {
        let head = body.strip_prefix('\u{feff}').unwrap_or(body).trim_start();
        if head.starts_with(WEBVTT_HEADER) {
            return Some(Self::WebVtt);
        }
        if SRT_CUE_TIMING.is_match(body) {
            return Some(Self::Srt);
        }
        Self::from_url(url)
    }

    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let (_, ext) = path.rsplit('/').next()?.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "vtt" | "webvtt" => Some(Self::WebVtt),
            "srt" => Some(Self::Srt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebVtt => "vtt",
            Self::Srt => "srt",
        }
    }
}

/// A subtitle track ready to attach to the media element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptionTrack {
    pub url: String,
    pub language: String,
    pub format: CaptionFormat,
    body: String,
}

impl CaptionTrack {
    /// Parse a fetched document.
    pub fn parse(
        url: impl Into<String>,
        language: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self, CaptionError> {
        let url = url.into();
        let body = body.into();
        if body.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}').is_empty() {
            return Err(CaptionError::EmptyDocument);
        }

        let format = CaptionFormat::detect(&url, &body).ok_or_else(|| {
            let format = url
                .rsplit('/')
                .next()
                .and_then(|file| file.rsplit_once('.'))
                .map(|(_, ext)| ext.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            CaptionError::UnsupportedFormat { format }
        })?;

        Ok(Self {
            url,
            language: language.into(),
            format,
            body,
        })
    }

    pub fn raw(&self) -> &str {
        &self.body
    }

    pub fn to_webvtt(&self) -> String {
        srt_to_webvtt(&self.body)
    }
}
