//! Error types for lyra-ca HTTP handlers

use crate::annotate::PipelineError;
use crate::cache::CacheError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. cancelling a finished run
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream corpus source failed (502)
    #[error("Upstream error: {0}")]
    BadGateway(String),

    /// Feature not configured (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// lyra-common error
    #[error("Common error: {0}")]
    Common(#[from] lyra_common::Error),
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::UnsupportedCorpus(corpus_type) => {
                ApiError::NotFound(format!("Unsupported corpus type: {}", corpus_type))
            }
            CacheError::InvalidKey(_) => ApiError::BadRequest(err.to_string()),
            CacheError::Transport(_) | CacheError::Parse(_) => ApiError::BadGateway(err.to_string()),
            CacheError::Durable(_) | CacheError::Internal(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_status_mapping() {
        let cases = [
            (CacheError::UnsupportedCorpus("opera".into()), StatusCode::NOT_FOUND),
            (CacheError::InvalidKey("x".into()), StatusCode::BAD_REQUEST),
            (CacheError::Transport("reset".into()), StatusCode::BAD_GATEWAY),
            (CacheError::Parse("eof".into()), StatusCode::BAD_GATEWAY),
            (CacheError::Internal("panic".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
