//! Cross-context invalidation
//!
//! Cache instances publish key invalidations and clears; every other
//! subscribed instance applies them to its own tiers. Events carry the
//! publisher's origin id so an instance can ignore its own echoes.

use super::CacheKey;
use chrono::Utc;
use futures::future::BoxFuture;
use lyra_common::events::{EventBus, LyraEvent};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Invalidation message exchanged between cache instances
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationEvent {
    Invalidate { key: CacheKey, origin: Uuid },
    Clear { origin: Uuid },
}

impl InvalidationEvent {
    pub fn origin(&self) -> Uuid {
        match self {
            InvalidationEvent::Invalidate { origin, .. } | InvalidationEvent::Clear { origin } => *origin,
        }
    }
}

pub type InvalidationHandler = Arc<dyn Fn(InvalidationEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Fan-out channel between cache instances
pub trait InvalidationBus: Send + Sync {
    /// Deliver to every current subscriber (including the publisher)
    fn publish(&self, event: InvalidationEvent);

    /// Start delivering events to `handler` until the subscription ends
    fn subscribe(&self, handler: InvalidationHandler) -> Subscription;
}

/// Handle for an active subscription; dropping it unsubscribes
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Invalidation bus carried on the application [`EventBus`]
///
/// Invalidations travel as `CacheInvalidated` / `CacheCleared` events, so SSE
/// clients see them too. A subscriber that lags behind the channel has lost
/// events it cannot identify and receives a `Clear` with a nil origin instead.
#[derive(Clone)]
pub struct BroadcastInvalidationBus {
    event_bus: EventBus,
}

impl BroadcastInvalidationBus {
    pub fn new(event_bus: EventBus) -> Self {
        Self { event_bus }
    }
}

impl InvalidationBus for BroadcastInvalidationBus {
    fn publish(&self, event: InvalidationEvent) {
        let event = match event {
            InvalidationEvent::Invalidate { key, origin } => LyraEvent::CacheInvalidated {
                key: key.to_string(),
                origin,
                timestamp: Utc::now(),
            },
            InvalidationEvent::Clear { origin } => LyraEvent::CacheCleared {
                origin,
                timestamp: Utc::now(),
            },
        };
        self.event_bus.emit_lossy(event);
    }

    fn subscribe(&self, handler: InvalidationHandler) -> Subscription {
        let mut rx = self.event_bus.subscribe();

        let task = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(LyraEvent::CacheInvalidated { key, origin, .. }) => match key.parse::<CacheKey>() {
                        Ok(key) => InvalidationEvent::Invalidate { key, origin },
                        Err(e) => {
                            tracing::warn!(error = %e, "Ignoring invalidation with malformed key");
                            continue;
                        }
                    },
                    Ok(LyraEvent::CacheCleared { origin, .. }) => InvalidationEvent::Clear { origin },
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Invalidation subscriber lagged, clearing local tiers");
                        InvalidationEvent::Clear { origin: Uuid::nil() }
                    }
                    Err(RecvError::Closed) => break,
                };
                handler(event).await;
            }
        });

        Subscription::new(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn forwarding_handler(tx: mpsc::UnboundedSender<InvalidationEvent>) -> InvalidationHandler {
        Arc::new(move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event);
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_published_events_reach_subscribers() {
        let bus = BroadcastInvalidationBus::new(EventBus::new(16));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = bus.subscribe(forwarding_handler(tx));

        let origin = Uuid::new_v4();
        let key = CacheKey::full("gaucho");
        bus.publish(InvalidationEvent::Invalidate {
            key: key.clone(),
            origin,
        });
        bus.publish(InvalidationEvent::Clear { origin });

        assert_eq!(
            rx.recv().await.unwrap(),
            InvalidationEvent::Invalidate { key, origin }
        );
        assert_eq!(rx.recv().await.unwrap(), InvalidationEvent::Clear { origin });
    }

    #[tokio::test]
    async fn test_non_cache_events_are_ignored() {
        let event_bus = EventBus::new(16);
        let bus = BroadcastInvalidationBus::new(event_bus.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = bus.subscribe(forwarding_handler(tx));

        event_bus.emit_lossy(LyraEvent::AnnotationStarted {
            run_id: Uuid::new_v4(),
            total_words: 1,
            total_chunks: 1,
            timestamp: Utc::now(),
        });
        event_bus.emit_lossy(LyraEvent::CacheInvalidated {
            key: "not-a-key".to_string(),
            origin: Uuid::new_v4(),
            timestamp: Utc::now(),
        });

        let nothing = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = BroadcastInvalidationBus::new(EventBus::new(16));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = bus.subscribe(forwarding_handler(tx));
        assert!(sub.is_active());

        sub.unsubscribe();
        tokio::task::yield_now().await;
        bus.publish(InvalidationEvent::Clear { origin: Uuid::new_v4() });

        // Sender dropped with the aborted task
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_gets_clear() {
        let bus = BroadcastInvalidationBus::new(EventBus::new(2));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = bus.subscribe(forwarding_handler(tx));

        // Overflow the channel before the subscriber task runs
        for _ in 0..5 {
            bus.publish(InvalidationEvent::Invalidate {
                key: CacheKey::full("gaucho"),
                origin: Uuid::new_v4(),
            });
        }

        assert_eq!(
            rx.recv().await.unwrap(),
            InvalidationEvent::Clear { origin: Uuid::nil() }
        );
    }
}
