//! HTTP client error types

/// Errors surfaced by [`crate::HttpClient`]
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Non-retryable error status with the API's structured error body
    #[error("HTTP {status} (code {code}): {message}")]
    Http {
        status: u16,
        code: u64,
        message: String,
    },

    /// Every attempt was bounced by a rate limit. Usually means several
    /// clients share one IP or token.
    #[error("Rate limit retries exhausted after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    /// 429 without the `via` header: blocked before reaching the API
    #[error("Request blocked at the network edge")]
    NetworkEdgeBan,

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP client is closed")]
    Closed,
}

impl HttpError {
    /// HTTP status carried by the error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::NetworkEdgeBan | Self::RateLimitExhausted { .. } => Some(429),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::InvalidResponse(_) | Self::Closed => None,
        }
    }
}

pub type HttpResult<T> = Result<T, HttpError>;
