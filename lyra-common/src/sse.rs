//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE implementation that forwards EventBus traffic to HTTP clients.

use crate::events::{EventBus, LyraEvent};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Heartbeat interval for idle SSE connections
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Create an SSE stream forwarding bus events accepted by `filter`
///
/// Sends a `ConnectionStatus` event first, then one SSE event per bus event
/// (SSE `event:` = [`LyraEvent::event_type`], data = JSON). Lagged receivers
/// skip the dropped events and keep streaming.
pub fn create_event_sse_stream<F>(
    service_name: &'static str,
    event_bus: &EventBus,
    filter: F,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    F: Fn(&LyraEvent) -> bool + Send + 'static,
{
    info!("New SSE client connected to {} events", service_name);

    let mut rx = event_bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !filter(&event) {
                        continue;
                    }
                    let event_type = event.event_type().to_string();
                    match serde_json::to_string(&event) {
                        Ok(event_json) => {
                            debug!("SSE: Broadcasting {} event", event_type);
                            yield Ok(Event::default().event(event_type).data(event_json));
                        }
                        Err(e) => {
                            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE: {} client lagged, skipped {} events", service_name, skipped);
                }
                Err(RecvError::Closed) => {
                    info!("SSE: {} event bus closed", service_name);
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
