//! Event types for the Lyra event system
//!
//! Provides shared event definitions and the EventBus used by all Lyra
//! services. The bus doubles as the cross-context transport for cache
//! invalidation: every cache instance subscribed to the same bus drops the
//! keys another instance invalidates.

mod annotation_types;

pub use annotation_types::{ChunkFailureInfo, RunSummaryInfo};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Lyra event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LyraEvent {
    /// A single corpus cache key was invalidated
    ///
    /// Triggers:
    /// - Sibling cache instances: drop the key from local tiers
    /// - SSE: dashboards refresh corpus views
    CacheInvalidated {
        /// Cache key in `{corpusType}:{kind}:{digest}` form
        key: String,
        /// Cache instance that published the invalidation
        origin: Uuid,
        /// When the key was invalidated
        timestamp: DateTime<Utc>,
    },

    /// Every corpus cache entry was cleared
    CacheCleared {
        /// Cache instance that published the clear
        origin: Uuid,
        /// When the cache was cleared
        timestamp: DateTime<Utc>,
    },

    /// Annotation run scheduled
    AnnotationStarted {
        /// Run identifier
        run_id: Uuid,
        /// Words submitted to the run
        total_words: usize,
        /// Chunks the words were split into
        total_chunks: usize,
        /// When the run started
        timestamp: DateTime<Utc>,
    },

    /// Annotation progress update
    ///
    /// `processed` never decreases within one run.
    AnnotationProgress {
        /// Run identifier
        run_id: Uuid,
        /// Words handed to the service so far
        processed: usize,
        /// Words in the run
        total: usize,
        /// 1-based chunk about to be processed (0 while scheduling)
        current_chunk: usize,
        /// Chunks in the run
        total_chunks: usize,
        /// Progress percentage (0.0-100.0)
        percentage: f64,
        /// Elapsed time in seconds
        elapsed_seconds: u64,
        /// Estimated remaining time in seconds (if available)
        estimated_remaining_seconds: Option<u64>,
        /// When progress updated
        timestamp: DateTime<Utc>,
    },

    /// A chunk exhausted its retries and was skipped
    AnnotationChunkFailed {
        /// Run identifier
        run_id: Uuid,
        /// Failure details
        failure: ChunkFailureInfo,
        /// When the chunk was given up
        timestamp: DateTime<Utc>,
    },

    /// Annotation run finished (possibly with reduced coverage)
    AnnotationCompleted {
        /// Run identifier
        run_id: Uuid,
        /// Aggregate summary
        summary: RunSummaryInfo,
        /// When the run completed
        timestamp: DateTime<Utc>,
    },

    /// Annotation run cancelled by the caller
    AnnotationCancelled {
        /// Run identifier
        run_id: Uuid,
        /// Summary of the partial aggregate
        summary: RunSummaryInfo,
        /// When cancellation took effect
        timestamp: DateTime<Utc>,
    },
}

impl LyraEvent {
    /// Event type name used for SSE `event:` fields
    pub fn event_type(&self) -> &str {
        match self {
            LyraEvent::CacheInvalidated { .. } => "CacheInvalidated",
            LyraEvent::CacheCleared { .. } => "CacheCleared",
            LyraEvent::AnnotationStarted { .. } => "AnnotationStarted",
            LyraEvent::AnnotationProgress { .. } => "AnnotationProgress",
            LyraEvent::AnnotationChunkFailed { .. } => "AnnotationChunkFailed",
            LyraEvent::AnnotationCompleted { .. } => "AnnotationCompleted",
            LyraEvent::AnnotationCancelled { .. } => "AnnotationCancelled",
        }
    }

    /// True for cache invalidation traffic
    pub fn is_cache_event(&self) -> bool {
        matches!(
            self,
            LyraEvent::CacheInvalidated { .. } | LyraEvent::CacheCleared { .. }
        )
    }
}

/// Central event distribution bus
///
/// Cloning is cheap; clones publish to and subscribe from the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LyraEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///
    /// # Examples
    ///
    /// ```
    /// use lyra_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(1000);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<LyraEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: LyraEvent) -> Result<usize, broadcast::error::SendError<LyraEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// # Examples
    ///
    /// ```
    /// use lyra_common::events::{EventBus, LyraEvent};
    /// use uuid::Uuid;
    ///
    /// let event_bus = EventBus::new(100);
    ///
    /// // Nobody listening yet - fine
    /// event_bus.emit_lossy(LyraEvent::CacheCleared {
    ///     origin: Uuid::new_v4(),
    ///     timestamp: chrono::Utc::now(),
    /// });
    /// ```
    pub fn emit_lossy(&self, event: LyraEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_delivers_to_all_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let origin = Uuid::new_v4();
        let delivered = bus
            .emit(LyraEvent::CacheCleared {
                origin,
                timestamp: Utc::now(),
            })
            .unwrap();
        assert_eq!(delivered, 2);

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                LyraEvent::CacheCleared { origin: got, .. } => assert_eq!(got, origin),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_emit_without_subscribers_errors() {
        let bus = EventBus::new(4);
        let result = bus.emit(LyraEvent::CacheCleared {
            origin: Uuid::new_v4(),
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = LyraEvent::CacheInvalidated {
            key: "gaucho:full:{}".to_string(),
            origin: Uuid::nil(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CacheInvalidated");
        assert_eq!(json["key"], "gaucho:full:{}");
        assert_eq!(event.event_type(), "CacheInvalidated");
        assert!(event.is_cache_event());
    }

    #[test]
    fn test_progress_event_round_trips() {
        let event = LyraEvent::AnnotationProgress {
            run_id: Uuid::new_v4(),
            processed: 100,
            total: 250,
            current_chunk: 2,
            total_chunks: 3,
            percentage: 40.0,
            elapsed_seconds: 3,
            estimated_remaining_seconds: Some(5),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: LyraEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "AnnotationProgress");
        assert!(!back.is_cache_event());
    }
}
