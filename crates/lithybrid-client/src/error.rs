//! Client error types.

use lithybrid_core::ErrorCode;
use thiserror::Error;

/// Errors returned by [`crate::ApiClient`].
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server answered with a non-success status.
    #[error("{status}: {message}")]
    Api {
        status: u16,
        code: Option<ErrorCode>,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Invalid base URL: {0}")]
    BaseUrl(String),

    /// A watched job reached `FAILED`.
    #[error("Job failed ({code}): {message}")]
    JobFailed { code: ErrorCode, message: String },

    #[error("Giving up after {0} consecutive errors")]
    TooManyErrors(u32),
}

impl ClientError {
    /// Whether polling should try again later instead of stopping.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Api { status, .. } => *status == 429 || *status >= 500,
            ClientError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
