//! Provider error handling shared by the voice and text backends.

use std::time::Duration;

/// Failure talking to an external AI provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(err.to_string())
        }
    }

    /// Turn a non-success response into an error, keeping a bounded body excerpt.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(500).collect();
        if status == 429 {
            Self::RateLimited(body)
        } else {
            Self::Http { status, body }
        }
    }
}

const RATE_LIMIT_MESSAGE: &str =
    "The provider is rate limiting requests. Please wait a moment and try again.";
const TIMEOUT_MESSAGE: &str = "The provider took too long to respond. Please try again.";

/// Rewrite provider failures into messages that are safe to show users.
///
/// Rate-limit and timeout failures are recognised from the message text so
/// wrapped errors from any layer are handled the same way.
pub fn sanitize_provider_error(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    if lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("429")
    {
        RATE_LIMIT_MESSAGE.to_string()
    } else if lower.contains("timed out") || lower.contains("timeout") {
        TIMEOUT_MESSAGE.to_string()
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(
            sanitize_provider_error("HTTP 429 Too Many Requests from api.vendor.internal"),
            RATE_LIMIT_MESSAGE
        );
        assert_eq!(
            sanitize_provider_error(&ProviderError::Timeout(Duration::from_secs(60)).to_string()),
            TIMEOUT_MESSAGE
        );
        assert_eq!(sanitize_provider_error("bad prompt"), "bad prompt");
    }
}
