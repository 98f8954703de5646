//! Annotation run driver
//!
//! Chunks run strictly one after another with a pause between them. Every
//! chunk is retried per [`RetryPolicy`]; a chunk that still fails is logged,
//! recorded and skipped. Progress is reported at scheduling, before each
//! chunk and once at the end (fast path: before the single chunk and at the
//! end).

use super::aggregate::AnnotationAggregate;
use super::chunk::schedule_chunks;
use super::client::RemoteAnnotator;
use super::progress::{ProgressReporter, ProgressTracker};
use super::retry::RetryPolicy;
use super::PipelineError;
use crate::models::AnnotationChunk;
use lyra_common::config::PipelineConfig;
use lyra_common::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationPipelineConfig {
    /// Maximum words per remote call
    pub chunk_size: usize,
    pub retry: RetryPolicy,
    /// Pause between successive chunks (not after the last)
    pub inter_chunk_delay: Duration,
}

impl Default for AnnotationPipelineConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for AnnotationPipelineConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            retry: RetryPolicy::new(config.max_attempts, Duration::from_millis(config.base_delay_ms)),
            inter_chunk_delay: Duration::from_millis(config.inter_chunk_delay_ms),
        }
    }
}

pub struct AnnotationPipeline {
    annotator: RemoteAnnotator,
    config: AnnotationPipelineConfig,
    clock: Arc<dyn Clock>,
}

impl AnnotationPipeline {
    pub fn new(annotator: RemoteAnnotator, config: AnnotationPipelineConfig) -> Self {
        Self {
            annotator,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AnnotationPipelineConfig {
        &self.config
    }

    /// Annotate `words` to completion
    pub async fn run(&self, words: &[String], reporter: &dyn ProgressReporter) -> Result<AnnotationAggregate, PipelineError> {
        self.run_with_cancel(words, reporter, &CancellationToken::new())
            .await
    }

    /// Annotate `words`, stopping early if `cancel` fires
    ///
    /// Cancellation is observed between chunks and during backoff or
    /// inter-chunk pauses. A cancelled run returns what it has so far with
    /// `cancelled` set and no final 100% report.
    pub async fn run_with_cancel(
        &self,
        words: &[String],
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<AnnotationAggregate, PipelineError> {
        let chunk_size = self.config.chunk_size;
        if chunk_size == 0 {
            return Err(PipelineError::InvalidChunkSize(chunk_size));
        }
        if words.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let total = words.len();
        let fast_path = total <= chunk_size;
        let chunks = if fast_path {
            vec![AnnotationChunk {
                index: 0,
                words: words.to_vec(),
            }]
        } else {
            schedule_chunks(words, chunk_size)?
        };
        let total_chunks = chunks.len();

        let mut tracker = ProgressTracker::new(total, total_chunks, self.clock.now());
        let mut aggregate = AnnotationAggregate::new(total, total_chunks);

        if fast_path {
            tracing::info!(words = total, "Annotating word list in a single call");
        } else {
            tracing::info!(words = total, chunks = total_chunks, chunk_size, "Annotation run scheduled");
            reporter.report(&tracker.snapshot(0, 0));
        }

        let mut processed = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                aggregate.cancelled = true;
                break;
            }

            if i > 0 && !self.config.inter_chunk_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        aggregate.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.config.inter_chunk_delay) => {}
                }
            }

            reporter.report(&tracker.snapshot(processed, i + 1));
            tracing::debug!(chunk = chunk.index, size = chunk.len(), "Processing chunk");

            let outcome = self
                .config
                .retry
                .run(chunk.index, cancel, || self.annotator.call(chunk))
                .await;

            match outcome.result {
                Ok(batch) => {
                    aggregate.record_success(chunk, outcome.attempts, batch);
                }
                Err(err) if outcome.cancelled => {
                    aggregate.record_failure(chunk, outcome.attempts, &err, true);
                    aggregate.cancelled = true;
                    break;
                }
                Err(err) => {
                    tracing::error!(
                        chunk = chunk.index,
                        size = chunk.len(),
                        attempts = outcome.attempts,
                        error = %err,
                        "Chunk failed, continuing with next chunk"
                    );
                    let failed = aggregate.record_failure(chunk, outcome.attempts, &err, false);
                    reporter.chunk_failed(failed);
                }
            }

            processed += chunk.len();
        }

        if aggregate.cancelled {
            tracing::info!(
                processed = aggregate.processed_words(),
                total,
                "Annotation run cancelled"
            );
            return Ok(aggregate);
        }

        reporter.report(&tracker.finish());
        tracing::info!(summary = %aggregate.display_string(), "Annotation run complete");

        Ok(aggregate)
    }
}
