//! Background annotation runs
//!
//! Each run executes on its own task with a cancellation token. The registry
//! keeps the latest progress snapshot and, once the run ends, its aggregate.
//! Only the most recently finished runs are kept; older ones are evicted
//! when a new run starts.

use super::aggregate::{AnnotationAggregate, ChunkOutcome};
use super::pipeline::AnnotationPipeline;
use super::progress::{EventBusProgress, ProgressReporter};
use crate::models::AnnotationProgress;
use chrono::{DateTime, Utc};
use lyra_common::events::{EventBus, LyraEvent, RunSummaryInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }
}

/// Externally visible state of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub run_id: Uuid,
    pub state: RunState,
    pub total_words: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<AnnotationProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummaryInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

struct RunRecord {
    status: RunStatus,
    token: CancellationToken,
    aggregate: Option<Arc<AnnotationAggregate>>,
}

/// Finished runs kept by [`RunRegistry::new`]
pub const DEFAULT_RETAINED_RUNS: usize = 32;

/// Tracks annotation runs started by this process
pub struct RunRegistry {
    runs: Mutex<HashMap<Uuid, RunRecord>>,
    retained: usize,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_RUNS)
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry keeping at most `retained` finished runs
    ///
    /// Running runs are never evicted.
    pub fn with_retention(retained: usize) -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            retained,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, RunRecord>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start `pipeline` over `words` on a background task
    ///
    /// Progress goes to the registry and to `event_bus`. Returns the new
    /// run's status immediately.
    pub fn start(
        self: &Arc<Self>,
        pipeline: AnnotationPipeline,
        words: Vec<String>,
        event_bus: EventBus,
    ) -> RunStatus {
        let run_id = Uuid::new_v4();
        let token = CancellationToken::new();
        let status = RunStatus {
            run_id,
            state: RunState::Running,
            total_words: words.len(),
            progress: None,
            summary: None,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        };

        let mut runs = self.lock();
        self.evict_finished(&mut runs);
        runs.insert(
            run_id,
            RunRecord {
                status: status.clone(),
                token: token.clone(),
                aggregate: None,
            },
        );
        drop(runs);

        let chunk_size = pipeline.config().chunk_size.max(1);
        event_bus.emit_lossy(LyraEvent::AnnotationStarted {
            run_id,
            total_words: words.len(),
            total_chunks: super::chunk_count(words.len(), chunk_size),
            timestamp: Utc::now(),
        });

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(run_id = %run_id, words = words.len(), "Background annotation run started");

            let reporter = RegistryProgress {
                registry: Arc::clone(&registry),
                run_id,
                events: EventBusProgress::new(event_bus.clone(), run_id),
            };

            match pipeline.run_with_cancel(&words, &reporter, &token).await {
                Ok(aggregate) => {
                    let summary = aggregate.summary();
                    let event = if aggregate.cancelled {
                        LyraEvent::AnnotationCancelled {
                            run_id,
                            summary: summary.clone(),
                            timestamp: Utc::now(),
                        }
                    } else {
                        LyraEvent::AnnotationCompleted {
                            run_id,
                            summary: summary.clone(),
                            timestamp: Utc::now(),
                        }
                    };
                    registry.finish(run_id, aggregate);
                    event_bus.emit_lossy(event);
                }
                Err(e) => {
                    tracing::error!(run_id = %run_id, error = %e, "Annotation run aborted");
                    registry.fail(run_id, e.to_string());
                }
            }
        });

        status
    }

    pub fn status(&self, run_id: Uuid) -> Option<RunStatus> {
        self.lock().get(&run_id).map(|r| r.status.clone())
    }

    /// Aggregate of a finished run
    pub fn aggregate(&self, run_id: Uuid) -> Option<Arc<AnnotationAggregate>> {
        self.lock().get(&run_id).and_then(|r| r.aggregate.clone())
    }

    pub fn list(&self) -> Vec<RunStatus> {
        let mut runs: Vec<RunStatus> = self.lock().values().map(|r| r.status.clone()).collect();
        runs.sort_by_key(|s| s.started_at);
        runs
    }

    /// Signal a run to stop
    ///
    /// `None` when the run is unknown; otherwise the state at the time of the
    /// call. Cancelling a terminal run is a no-op.
    pub fn cancel(&self, run_id: Uuid) -> Option<RunState> {
        let runs = self.lock();
        let record = runs.get(&run_id)?;
        if !record.status.state.is_terminal() {
            record.token.cancel();
            tracing::info!(run_id = %run_id, "Annotation run cancellation requested");
        }
        Some(record.status.state)
    }

    /// Cancel every running run (service shutdown)
    pub fn cancel_all(&self) {
        for record in self.lock().values() {
            record.token.cancel();
        }
    }

    /// Drop the oldest finished runs beyond the retention limit
    fn evict_finished(&self, runs: &mut HashMap<Uuid, RunRecord>) {
        let mut finished: Vec<(DateTime<Utc>, Uuid)> = runs
            .values()
            .filter(|r| r.status.state.is_terminal())
            .map(|r| (r.status.ended_at.unwrap_or(r.status.started_at), r.status.run_id))
            .collect();
        if finished.len() <= self.retained {
            return;
        }

        finished.sort();
        let excess = finished.len() - self.retained;
        for (_, run_id) in finished.into_iter().take(excess) {
            runs.remove(&run_id);
        }
        tracing::debug!(evicted = excess, retained = self.retained, "Evicted finished annotation runs");
    }

    fn update_progress(&self, run_id: Uuid, progress: &AnnotationProgress) {
        if let Some(record) = self.lock().get_mut(&run_id) {
            record.status.progress = Some(progress.clone());
        }
    }

    fn finish(&self, run_id: Uuid, aggregate: AnnotationAggregate) {
        if let Some(record) = self.lock().get_mut(&run_id) {
            record.status.state = if aggregate.cancelled {
                RunState::Cancelled
            } else {
                RunState::Completed
            };
            record.status.summary = Some(aggregate.summary());
            record.status.ended_at = Some(Utc::now());
            record.aggregate = Some(Arc::new(aggregate));
        }
    }

    fn fail(&self, run_id: Uuid, error: String) {
        if let Some(record) = self.lock().get_mut(&run_id) {
            record.status.state = RunState::Failed;
            record.status.error = Some(error);
            record.status.ended_at = Some(Utc::now());
        }
    }
}

/// Mirrors progress into the registry and onto the event bus
struct RegistryProgress {
    registry: Arc<RunRegistry>,
    run_id: Uuid,
    events: EventBusProgress,
}

impl ProgressReporter for RegistryProgress {
    fn report(&self, progress: &AnnotationProgress) {
        self.registry.update_progress(self.run_id, progress);
        self.events.report(progress);
    }

    fn chunk_failed(&self, outcome: &ChunkOutcome) {
        self.events.chunk_failed(outcome);
    }
}
