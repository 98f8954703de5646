//! Progress reporting

use super::aggregate::ChunkOutcome;
use crate::models::AnnotationProgress;
use chrono::{DateTime, Utc};
use lyra_common::events::{ChunkFailureInfo, EventBus, LyraEvent};
use tokio::time::Instant;
use uuid::Uuid;

/// Receives progress snapshots during a run
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: &AnnotationProgress);

    /// A chunk exhausted its attempts and was skipped
    fn chunk_failed(&self, _outcome: &ChunkOutcome) {}
}

impl<F> ProgressReporter for F
where
    F: Fn(&AnnotationProgress) + Send + Sync,
{
    fn report(&self, progress: &AnnotationProgress) {
        self(progress)
    }
}

/// Publishes progress on the application event bus
pub struct EventBusProgress {
    event_bus: EventBus,
    run_id: Uuid,
}

impl EventBusProgress {
    pub fn new(event_bus: EventBus, run_id: Uuid) -> Self {
        Self { event_bus, run_id }
    }
}

impl ProgressReporter for EventBusProgress {
    fn report(&self, progress: &AnnotationProgress) {
        self.event_bus.emit_lossy(LyraEvent::AnnotationProgress {
            run_id: self.run_id,
            processed: progress.processed,
            total: progress.total,
            current_chunk: progress.current_chunk,
            total_chunks: progress.total_chunks,
            percentage: progress.percentage,
            elapsed_seconds: progress.elapsed_seconds,
            estimated_remaining_seconds: progress.estimated_remaining_seconds,
            timestamp: Utc::now(),
        });
    }

    fn chunk_failed(&self, outcome: &ChunkOutcome) {
        self.event_bus.emit_lossy(LyraEvent::AnnotationChunkFailed {
            run_id: self.run_id,
            failure: ChunkFailureInfo {
                chunk_index: outcome.index,
                chunk_size: outcome.size,
                attempts: outcome.attempts,
                error: outcome.error.clone().unwrap_or_default(),
            },
            timestamp: Utc::now(),
        });
    }
}

/// Builds monotonic progress snapshots with an ETA
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    total_chunks: usize,
    started_at: DateTime<Utc>,
    start: Instant,
    processed: usize,
}

impl ProgressTracker {
    pub fn new(total: usize, total_chunks: usize, started_at: DateTime<Utc>) -> Self {
        Self {
            total,
            total_chunks,
            started_at,
            start: Instant::now(),
            processed: 0,
        }
    }

    /// Snapshot at `processed` words; never reports fewer than a previous call
    pub fn snapshot(&mut self, processed: usize, current_chunk: usize) -> AnnotationProgress {
        self.processed = self.processed.max(processed.min(self.total));
        let processed = self.processed;

        let percentage = if self.total == 0 {
            100.0
        } else {
            processed as f64 / self.total as f64 * 100.0
        };

        let elapsed = self.start.elapsed();
        let estimated_remaining_seconds = if processed == self.total {
            Some(0)
        } else if processed == 0 {
            None
        } else {
            let per_word = elapsed.as_secs_f64() / processed as f64;
            Some((per_word * (self.total - processed) as f64).round() as u64)
        };

        AnnotationProgress {
            processed,
            total: self.total,
            current_chunk,
            total_chunks: self.total_chunks,
            percentage,
            started_at: self.started_at,
            elapsed_seconds: elapsed.as_secs(),
            estimated_remaining_seconds,
        }
    }

    /// Final snapshot: everything processed
    pub fn finish(&mut self) -> AnnotationProgress {
        self.snapshot(self.total, self.total_chunks)
    }
}
