//! Event bus: fan-out to every subscriber of an event type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::event::DomainEvent;

/// Receives published events of the types it subscribed to.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Stable name, used for logging and failure reports.
    fn name(&self) -> &str;

    async fn handle(&self, event: &DomainEvent) -> Result<()>;
}

/// Fan-out bus. Publication delivers to every subscriber concurrently
/// and reports all failures rather than stopping at the first.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Arc<dyn EventSubscriber>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, event_type: &str, subscriber: Arc<dyn EventSubscriber>) {
        let mut subscribers = self.subscribers.write().await;
        subscribers
            .entry(event_type.to_string())
            .or_default()
            .push(subscriber);
    }

    /// Deliver an event to all subscribers of its type. No subscribers
    /// is a success. One subscriber failing never prevents delivery to
    /// the others.
    pub async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let targets = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .get(&event.event_type)
                .cloned()
                .unwrap_or_default()
        };

        if targets.is_empty() {
            debug!(event.event_type = %event.event_type, "no subscribers");
            return Ok(());
        }

        let total = targets.len();
        let deliveries = targets.iter().map(|subscriber| subscriber.handle(event));
        let outcomes = futures::future::join_all(deliveries).await;

        let mut failures = Vec::new();
        for (subscriber, outcome) in targets.iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!(
                    subscriber.name = subscriber.name(),
                    event.event_type = %event.event_type,
                    error = %e,
                    "subscriber failed"
                );
                failures.push(format!("{}: {e}", subscriber.name()));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CoreError::PublishFailed {
                event_type: event.event_type.clone(),
                failed: failures.len(),
                total,
                details: failures.join("; "),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct Recorder {
        name: String,
        seen: AtomicUsize,
        fail: bool,
    }

    impl Recorder {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                seen: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl EventSubscriber for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, _event: &DomainEvent) -> Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CoreError::Validation("boom".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn make_event(event_type: &str) -> DomainEvent {
        DomainEvent::new(Uuid::new_v4(), "player", event_type, 1, json!({}))
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers_of_type() {
        let bus = EventBus::new();
        let first = Recorder::new("first", false);
        let second = Recorder::new("second", false);
        let other = Recorder::new("other", false);
        bus.subscribe("player.created", first.clone()).await;
        bus.subscribe("player.created", second.clone()).await;
        bus.subscribe("player.banned", other.clone()).await;

        bus.publish(&make_event("player.created")).await.unwrap();

        assert_eq!(first.seen.load(Ordering::SeqCst), 1);
        assert_eq!(second.seen.load(Ordering::SeqCst), 1);
        assert_eq!(other.seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_publish_with_no_subscribers_succeeds() {
        let bus = EventBus::new();
        bus.publish(&make_event("player.created")).await.unwrap();
    }

    #[tokio::test]
    async fn test_one_failing_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        let failing = Recorder::new("failing", true);
        let healthy = Recorder::new("healthy", false);
        bus.subscribe("player.created", failing.clone()).await;
        bus.subscribe("player.created", healthy.clone()).await;

        let err = bus.publish(&make_event("player.created")).await.unwrap_err();

        assert_eq!(healthy.seen.load(Ordering::SeqCst), 1);
        match err {
            CoreError::PublishFailed { failed, total, .. } => {
                assert_eq!(failed, 1);
                assert_eq!(total, 2);
            }
            other => panic!("expected PublishFailed, got {other}"),
        }
    }
}
