//! Error types for LitHybrid.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::models::{ErrorCode, JobState};

/// Result type alias using LitHybrid's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for LitHybrid operations.
#[derive(Error, Debug)]
pub enum Error {
    /// PostgreSQL job store operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis job store operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Job store is unreachable or returned something unusable
    #[error("Store error: {0}")]
    Store(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// Job is not in a state that allows the operation
    #[error("Job {id} is {state}, not {expected}")]
    NotReady {
        id: Uuid,
        state: JobState,
        expected: JobState,
    },

    /// Forbidden state machine transition
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable error code reported to API callers.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Database(_) | Error::Redis(_) | Error::Store(_) | Error::Serialization(_) => {
                ErrorCode::StoreError
            }
            Error::NotFound(_) | Error::JobNotFound(_) => ErrorCode::NotFound,
            Error::InvalidInput(_) => ErrorCode::ValidationError,
            Error::NotReady { .. } => ErrorCode::NotReady,
            Error::Request(_) => ErrorCode::ProviderError,
            Error::InvalidTransition { .. } | Error::Config(_) | Error::Internal(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// Whether this error comes from the job store infrastructure.
    pub fn is_store_error(&self) -> bool {
        self.code() == ErrorCode::StoreError
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

/// Failure reported by a paper source adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Network, protocol, or decoding failure at the provider.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider refused the request itself; repeating it cannot succeed.
    #[error("Provider rejected the request: {0}")]
    Rejected(String),

    /// Provider throttled the request.
    #[error("Rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    /// Provider returned zero matches.
    #[error("No matching papers found")]
    Empty,
}

impl SourceError {
    /// Error code recorded on the job when this failure becomes terminal.
    pub fn code(&self) -> ErrorCode {
        match self {
            SourceError::Provider(_) | SourceError::Rejected(_) => ErrorCode::ProviderError,
            SourceError::RateLimited { .. } => ErrorCode::RateLimited,
            SourceError::Empty => ErrorCode::Empty,
        }
    }

    /// Check if this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::Provider(_) | SourceError::RateLimited { .. }
        )
    }

    /// Provider-requested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_job_not_found() {
        let id = Uuid::nil();
        let err = Error::JobNotFound(id);
        assert_eq!(err.to_string(), format!("Job not found: {}", id));
    }

    #[test]
    fn test_error_display_invalid_transition() {
        let err = Error::InvalidTransition {
            from: JobState::Done,
            to: JobState::Composing,
        };
        assert_eq!(err.to_string(), "Invalid transition: DONE -> COMPOSING");
    }

    #[test]
    fn test_error_display_not_ready() {
        let err = Error::NotReady {
            id: Uuid::nil(),
            state: JobState::Pending,
            expected: JobState::Done,
        };
        assert!(err.to_string().contains("is PENDING, not DONE"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::InvalidInput("x".into()).code(),
            ErrorCode::ValidationError
        );
        assert_eq!(Error::JobNotFound(Uuid::nil()).code(), ErrorCode::NotFound);
        assert_eq!(Error::Store("down".into()).code(), ErrorCode::StoreError);
        assert!(Error::Store("down".into()).is_store_error());
        assert!(!Error::NotFound("x".into()).is_store_error());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.is_store_error());
    }

    #[test]
    fn test_source_error_codes() {
        assert_eq!(
            SourceError::Provider("boom".into()).code(),
            ErrorCode::ProviderError
        );
        assert_eq!(
            SourceError::RateLimited { retry_after: None }.code(),
            ErrorCode::RateLimited
        );
        assert_eq!(SourceError::Empty.code(), ErrorCode::Empty);
    }

    #[test]
    fn test_source_error_retryable() {
        assert!(SourceError::Provider("x".into()).is_retryable());
        assert!(SourceError::RateLimited { retry_after: None }.is_retryable());
        assert!(!SourceError::Empty.is_retryable());
        assert!(!SourceError::Rejected("HTTP 400".into()).is_retryable());
    }

    #[test]
    fn test_rejected_is_a_provider_error() {
        let err = SourceError::Rejected("HTTP 400".into());
        assert_eq!(err.code(), ErrorCode::ProviderError);
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_source_error_retry_after() {
        let err = SourceError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(SourceError::Empty.retry_after(), None);
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
        assert_send::<SourceError>();
        assert_sync::<SourceError>();
    }
}
