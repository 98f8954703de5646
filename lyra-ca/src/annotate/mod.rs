//! Chunked remote annotation pipeline
//!
//! Splits a word list into bounded chunks, sends them one at a time to the
//! semantic classification service with retry/backoff, validates every
//! response and merges the accepted labels into one aggregate. A chunk that
//! keeps failing is skipped; the run still completes with reduced coverage.

pub mod aggregate;
pub mod chunk;
pub mod client;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod runs;

pub use aggregate::{AnnotationAggregate, ChunkOutcome, ChunkStatus};
pub use chunk::{chunk_count, schedule_chunks};
pub use client::{
    validate_response, AnnotationRequest, ClassificationService, HttpClassificationService,
    RemoteAnnotator, ValidatedBatch,
};
pub use pipeline::{AnnotationPipeline, AnnotationPipelineConfig};
pub use progress::{EventBusProgress, ProgressReporter, ProgressTracker};
pub use retry::{RetryOutcome, RetryPolicy};
pub use runs::{RunRegistry, RunState, RunStatus};

use thiserror::Error;

/// Failure of a single remote annotation call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnnotateError {
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP 429 or an equivalent throttling signal
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Service returned HTTP {0}: {1}")]
    Status(u16, String),

    #[error("Service rejected credentials")]
    Unauthorized,

    #[error("Service returned no payload")]
    EmptyResponse,

    /// Payload carried `success: false`
    #[error("Service reported failure: {0}")]
    ServiceFailure(String),

    /// Payload did not match the response schema
    #[error("Malformed results: {0}")]
    MalformedResults(String),
}

impl AnnotateError {
    /// Whether another attempt could succeed
    ///
    /// Credential problems and client errors other than 408/429 are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnnotateError::Unauthorized => false,
            AnnotateError::Status(code, _) => !((400..500).contains(code) && *code != 408 && *code != 429),
            _ => true,
        }
    }

    /// Whether the failure is a throttling signal
    pub fn is_rate_limit(&self) -> bool {
        match self {
            AnnotateError::RateLimited(_) => true,
            AnnotateError::Status(429, _) => true,
            AnnotateError::Transport(message) | AnnotateError::ServiceFailure(message) => {
                let lower = message.to_lowercase();
                lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
            }
            _ => false,
        }
    }
}

/// Errors that stop a run before any chunk is processed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Word list is empty")]
    EmptyInput,

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AnnotateError::Transport("reset".to_string()).is_retryable());
        assert!(AnnotateError::EmptyResponse.is_retryable());
        assert!(AnnotateError::ServiceFailure("quota exceeded".to_string()).is_retryable());
        assert!(AnnotateError::MalformedResults("x".to_string()).is_retryable());
        assert!(AnnotateError::Status(503, String::new()).is_retryable());
        assert!(AnnotateError::Status(429, String::new()).is_retryable());
        assert!(AnnotateError::Status(408, String::new()).is_retryable());

        assert!(!AnnotateError::Unauthorized.is_retryable());
        assert!(!AnnotateError::Status(400, String::new()).is_retryable());
        assert!(!AnnotateError::Status(404, String::new()).is_retryable());
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(AnnotateError::RateLimited(String::new()).is_rate_limit());
        assert!(AnnotateError::Status(429, String::new()).is_rate_limit());
        assert!(AnnotateError::ServiceFailure("Rate limit exceeded".to_string()).is_rate_limit());
        assert!(AnnotateError::Transport("upstream said 429".to_string()).is_rate_limit());

        assert!(!AnnotateError::ServiceFailure("quota exceeded".to_string()).is_rate_limit());
        assert!(!AnnotateError::Status(503, String::new()).is_rate_limit());
    }
}
