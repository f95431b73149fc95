//! Error types for character generation.

use std::time::Duration;

/// Errors that can occur while forging an image or improving a prompt.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// API key missing or rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The selected key or project cannot see the requested entity.
    #[error("credential missing: {0}")]
    CredentialMissing(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// The backend answered but produced no image part.
    #[error("the API did not return an image part in the response")]
    NoImageReturned,

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data or a data URI.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., reading an upload or saving a result).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ForgeError {
    /// Returns true if the failure came from the remote service or the
    /// transport rather than from local validation.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Auth(_)
                | Self::CredentialMissing(_)
                | Self::Api { .. }
                | Self::RateLimited { .. }
                | Self::ContentBlocked(_)
                | Self::Network(_)
                | Self::Json(_)
        )
    }

    /// Returns true if the user should be asked to pick another API key.
    pub fn is_credential_missing(&self) -> bool {
        matches!(self, Self::CredentialMissing(_) | Self::Auth(_))
    }

    /// Returns the suggested retry delay, if the service sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for forge operations.
pub type Result<T> = std::result::Result<T, ForgeError>;

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Trims an upstream error body to something safe to show and log.
///
/// Redacts anything that looks like a Google API key and truncates long
/// bodies on a character boundary.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let redacted: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            if let Some(pos) = word.find("AIza") {
                format!("{}[REDACTED]", &word[..pos])
            } else {
                word.to_string()
            }
        })
        .collect();
    let joined = redacted.join(" ");

    if joined.chars().count() <= MAX_ERROR_MESSAGE_LEN {
        return joined;
    }
    let truncated: String = joined.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
    format!("{truncated}...")
}

/// Parses a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
