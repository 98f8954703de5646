//! Server-Sent Events (SSE) stream of service events

use crate::AppState;
use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;

/// GET /events query
#[derive(Debug, Default, Deserialize)]
pub struct EventStreamQuery {
    /// `cache` or `annotation`; all events when absent
    #[serde(default)]
    pub topic: Option<String>,
}

/// GET /events - SSE stream of cache and annotation events
///
/// Streams:
/// - CacheInvalidated, CacheCleared
/// - AnnotationStarted, AnnotationProgress, AnnotationChunkFailed
/// - AnnotationCompleted, AnnotationCancelled
pub async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventStreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let topic = query.topic.map(|t| t.to_lowercase());
    lyra_common::sse::create_event_sse_stream("lyra-ca", &state.event_bus, move |event| {
        match topic.as_deref() {
            Some("cache") => event.is_cache_event(),
            Some("annotation") => !event.is_cache_event(),
            _ => true,
        }
    })
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/events", get(event_stream))
}
