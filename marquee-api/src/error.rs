//! Catalog client errors.

use std::time::Duration;

use marquee_core::FetchError;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl ApiClientError {
    /// Collapse into the core fetch taxonomy, tagged with the endpoint.
    pub fn into_fetch_error(self, endpoint: &str) -> FetchError {
        let endpoint = endpoint.to_string();
        match self {
            Self::Status { status, .. } => FetchError::Status { endpoint, status },
            Self::Timeout(after) => FetchError::Timeout { endpoint, after },
            Self::Http(e) if e.is_timeout() => FetchError::Timeout {
                endpoint,
                after: Duration::ZERO,
            },
            Self::Http(e) => match e.status() {
                Some(status) => FetchError::Status {
                    endpoint,
                    status: status.as_u16(),
                },
                None => FetchError::Network {
                    endpoint,
                    reason: e.to_string(),
                },
            },
            Self::Serde(e) => FetchError::InvalidResponse {
                endpoint,
                reason: e.to_string(),
            },
            Self::InvalidResponse(reason) | Self::Config(reason) => {
                FetchError::InvalidResponse { endpoint, reason }
            }
        }
    }
}
