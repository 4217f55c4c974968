//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use lithybrid_core::{Error, ErrorCode};

/// Error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub code: ErrorCode,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    NotReady(String),
    #[error("Too many requests, please wait before retrying")]
    RateLimited,
    #[error("Job store unavailable: {0}")]
    Store(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotReady(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Validation(_) => ErrorCode::ValidationError,
            ApiError::NotFound(_) => ErrorCode::NotFound,
            ApiError::NotReady(_) => ErrorCode::NotReady,
            ApiError::RateLimited => ErrorCode::RateLimited,
            ApiError::Store(_) => ErrorCode::StoreError,
            ApiError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::JobNotFound(id) => ApiError::NotFound(format!("Job not found: {}", id)),
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::Validation(msg),
            e @ Error::NotReady { .. } => ApiError::NotReady(e.to_string()),
            e if e.is_store_error() => ApiError::Store(e.to_string()),
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = %self.code(), error = %self, "Request failed");
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Rate limit exceeded");
        }

        let body = Json(ErrorBody {
            error: self.to_string(),
            code: self.code(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lithybrid_core::JobState;
    use uuid::Uuid;

    #[test]
    fn test_core_errors_map_to_http() {
        let cases = [
            (Error::JobNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (Error::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (
                Error::NotReady {
                    id: Uuid::nil(),
                    state: JobState::Pending,
                    expected: JobState::Done,
                },
                StatusCode::CONFLICT,
            ),
            (Error::Store("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::Config("oops".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(ApiError::NotReady("x".into()).code(), ErrorCode::NotReady);
        assert_eq!(ApiError::Store("x".into()).code(), ErrorCode::StoreError);
        assert_eq!(ApiError::RateLimited.code(), ErrorCode::RateLimited);
    }
}
