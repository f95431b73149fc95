//! Gemini (Google) `generateContent` backend.

use crate::client::content::{ContentRequest, ContentResponse};
use crate::client::ContentBackend;
use crate::error::{parse_retry_after, sanitize_error_message, ForgeError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Instant;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GOOGLE_API_KEY", "API_KEY"];

/// Builder for GeminiBackend.
#[derive(Debug, Clone, Default)]
pub struct GeminiBackendBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
}

impl GeminiBackendBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GOOGLE_API_KEY`, then `API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the API root (for proxies).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Builds the backend, resolving the API key.
    pub fn build(self) -> Result<GeminiBackend> {
        let api_key = self
            .api_key
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .find_map(|name| std::env::var(name).ok())
            })
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ForgeError::Auth("GOOGLE_API_KEY not set and no API key provided".into())
            })?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(GeminiBackend {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        })
    }
}

/// HTTP client for the Gemini `generateContent` endpoint.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiBackend {
    /// Creates a new `GeminiBackendBuilder`.
    pub fn builder() -> GeminiBackendBuilder {
        GeminiBackendBuilder::new()
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, model
        )
    }
}

#[async_trait]
impl ContentBackend for GeminiBackend {
    async fn generate_content(
        &self,
        model: &str,
        request: &ContentRequest,
    ) -> Result<ContentResponse> {
        let start = Instant::now();

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }

        let bytes = response.bytes().await?;
        let body = decode_response(&bytes)?;
        tracing::debug!(
            model,
            duration_ms = start.elapsed().as_millis() as u64,
            candidates = body.candidates.len(),
            "generateContent complete"
        );
        Ok(body)
    }
}

/// Decodes a success body; malformed JSON is reported as `ForgeError::Json`.
fn decode_response(bytes: &[u8]) -> Result<ContentResponse> {
    Ok(serde_json::from_slice(bytes)?)
}

#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<GoogleErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

/// `ErrorInfo` reasons Google sends for a rejected or unusable key.
const API_KEY_REASONS: [&str; 3] = ["API_KEY_INVALID", "API_KEY_EXPIRED", "API_KEY_SERVICE_BLOCKED"];

/// Maps a non-success response to a classified error.
///
/// The model identifiers are fixed, so `NOT_FOUND` means the active key or
/// project cannot see them and is reported as a missing credential. A bad
/// key arrives as 400 `INVALID_ARGUMENT` and is only recognizable by the
/// `ErrorInfo` reason in `details`.
fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> ForgeError {
    let (message, google_status, key_rejected) =
        match serde_json::from_str::<GoogleErrorEnvelope>(text) {
            Ok(envelope) => {
                let key_rejected = envelope.error.details.iter().any(|d| {
                    d.reason
                        .as_deref()
                        .is_some_and(|r| API_KEY_REASONS.contains(&r))
                });
                (envelope.error.message, envelope.error.status, key_rejected)
            }
            Err(_) => (text.to_string(), None, false),
        };
    let message = sanitize_error_message(&message);

    if key_rejected {
        return ForgeError::Auth(message);
    }

    if status == 404 || google_status.as_deref() == Some("NOT_FOUND") {
        return ForgeError::CredentialMissing(message);
    }
    if status == 429 {
        let retry_after = parse_retry_after(headers).map(std::time::Duration::from_secs);
        return ForgeError::RateLimited { retry_after };
    }
    if status == 401
        || status == 403
        || google_status.as_deref() == Some("UNAUTHENTICATED")
        || google_status.as_deref() == Some("PERMISSION_DENIED")
    {
        return ForgeError::Auth(message);
    }
    let lower = message.to_lowercase();
    if lower.contains("safety")
        || lower.contains("blocked")
        || lower.contains("prohibited")
    {
        return ForgeError::ContentBlocked(message);
    }
    ForgeError::Api { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    #[test]
    fn test_builder_with_explicit_key() {
        let backend = GeminiBackendBuilder::new()
            .api_key("test-key")
            .base_url("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!(
            backend.endpoint("gemini-2.5-flash-image"),
            "http://localhost:8080/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
    }

    #[test]
    fn test_builder_rejects_blank_key() {
        let result = GeminiBackendBuilder::new().api_key("  ").build();
        assert!(matches!(result, Err(ForgeError::Auth(_))));
    }

    #[test]
    fn test_default_endpoint() {
        let backend = GeminiBackend::builder().api_key("k").build().unwrap();
        assert_eq!(
            backend.endpoint("gemini-3-flash-preview"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-flash-preview:generateContent"
        );
    }

    #[test]
    fn test_decode_response() {
        let body = br#"{"candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "AAAA"}}]}}]}"#;
        let response = decode_response(body).unwrap();
        assert_eq!(response.first_inline_image().unwrap().data, "AAAA");

        let err = decode_response(b"<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, ForgeError::Json(_)));
        assert!(err.is_upstream());
    }

    #[test]
    fn test_parse_error_not_found_is_credential_missing() {
        let body = r#"{"error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}}"#;
        let err = parse_error(404, body, &HeaderMap::new());
        assert!(matches!(err, ForgeError::CredentialMissing(ref m) if m == "Requested entity was not found."));
        assert!(err.is_credential_missing());
    }

    #[test]
    fn test_parse_error_auth() {
        let body = r#"{"error": {"code": 401, "message": "Request had invalid authentication credentials.", "status": "UNAUTHENTICATED"}}"#;
        assert!(matches!(
            parse_error(401, body, &HeaderMap::new()),
            ForgeError::Auth(_)
        ));
        assert!(matches!(
            parse_error(403, "forbidden", &HeaderMap::new()),
            ForgeError::Auth(_)
        ));
    }

    #[test]
    fn test_parse_error_invalid_api_key() {
        let body = r#"{
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT",
                "details": [
                    {
                        "@type": "type.googleapis.com/google.rpc.ErrorInfo",
                        "reason": "API_KEY_INVALID",
                        "domain": "googleapis.com",
                        "metadata": {"service": "generativelanguage.googleapis.com"}
                    },
                    {
                        "@type": "type.googleapis.com/google.rpc.LocalizedMessage",
                        "locale": "en-US",
                        "message": "API key not valid. Please pass a valid API key."
                    }
                ]
            }
        }"#;
        let err = parse_error(400, body, &HeaderMap::new());
        assert!(matches!(
            err,
            ForgeError::Auth(ref m) if m == "API key not valid. Please pass a valid API key."
        ));
        assert!(err.is_credential_missing());
    }

    #[test]
    fn test_parse_error_invalid_argument_without_key_reason() {
        let body = r#"{"error": {"code": 400, "message": "Unsupported MIME type", "status": "INVALID_ARGUMENT", "details": [{"reason": "BAD_REQUEST"}]}}"#;
        let err = parse_error(400, body, &HeaderMap::new());
        assert!(matches!(err, ForgeError::Api { status: 400, .. }));
        assert!(!err.is_credential_missing());
    }

    #[test]
    fn test_parse_error_rate_limited() {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "12".parse().unwrap());
        let err = parse_error(429, "slow down", &headers);
        assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(12)));
    }

    #[test]
    fn test_parse_error_fallbacks() {
        assert!(matches!(
            parse_error(400, "Request blocked by safety settings", &HeaderMap::new()),
            ForgeError::ContentBlocked(_)
        ));
        assert!(matches!(
            parse_error(500, "internal", &HeaderMap::new()),
            ForgeError::Api { status: 500, ref message } if message == "internal"
        ));
    }
}
