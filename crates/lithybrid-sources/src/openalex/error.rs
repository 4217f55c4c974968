//! OpenAlex-specific error handling.

use std::time::Duration;

use lithybrid_core::SourceError;
use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Classified OpenAlex HTTP failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAlexErrorCode {
    /// 429 Too Many Requests.
    RateLimited,
    /// 5xx.
    ServerError,
    /// Other 4xx: malformed query or unsupported parameter.
    BadRequest,
    Unknown,
}

impl OpenAlexErrorCode {
    /// Determine error code from HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            400..=499 => Self::BadRequest,
            _ => Self::Unknown,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::ServerError)
    }
}

/// Parse a `Retry-After` header given in seconds.
///
/// HTTP-date values are ignored; the caller's backoff applies instead.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Convert an OpenAlex failure into the adapter error taxonomy.
pub fn to_source_error(
    code: OpenAlexErrorCode,
    status: u16,
    retry_after: Option<Duration>,
) -> SourceError {
    let message = match code {
        OpenAlexErrorCode::RateLimited => return SourceError::RateLimited { retry_after },
        OpenAlexErrorCode::ServerError => format!("OpenAlex server error: HTTP {}", status),
        OpenAlexErrorCode::BadRequest => format!("OpenAlex rejected the query: HTTP {}", status),
        OpenAlexErrorCode::Unknown => format!("OpenAlex unexpected response: HTTP {}", status),
    };
    if code.is_retryable() {
        SourceError::Provider(message)
    } else {
        SourceError::Rejected(message)
    }
}

/// Network or decode failure from reqwest.
pub fn from_reqwest(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Provider(format!("OpenAlex request timed out: {}", e))
    } else if e.is_decode() {
        SourceError::Provider(format!("OpenAlex response undecodable: {}", e))
    } else {
        SourceError::Provider(format!("OpenAlex request failed: {}", e))
    }
}
