//! Projections: read models fed by the event bus.
//!
//! Every projection is wrapped in a position tracker that drops events
//! at or below the last projected version per stream, so redelivery and
//! out-of-order arrivals cannot corrupt a read model.

mod guild_directory;
mod player_roster;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bus::{EventBus, EventSubscriber};
use crate::error::Result;
use crate::event::DomainEvent;
use crate::interfaces::EventStore;

pub use guild_directory::{GuildDirectory, GuildEntry};
pub use player_roster::{PlayerRoster, RosterEntry};

/// A read model projected from events.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Stable name, used for logging and subscription.
    fn name(&self) -> &str;

    /// The event types this projection consumes.
    fn event_types(&self) -> &'static [&'static str];

    /// Fold one event into the read model.
    async fn project(&self, event: &DomainEvent) -> Result<()>;

    /// Discard all projected state.
    async fn reset(&self);
}

/// Wraps a projection with per-stream position tracking for idempotent
/// delivery.
pub struct TrackedProjection {
    projection: Arc<dyn Projection>,
    positions: RwLock<HashMap<(String, Uuid), u64>>,
}

impl TrackedProjection {
    pub fn new(projection: Arc<dyn Projection>) -> Self {
        Self {
            projection,
            positions: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        self.projection.name()
    }

    pub fn event_types(&self) -> &'static [&'static str] {
        self.projection.event_types()
    }

    /// Project the event unless this stream position was already seen.
    /// The position advances only after a successful projection, so a
    /// failed delivery can be retried.
    pub async fn deliver(&self, event: &DomainEvent) -> Result<()> {
        let key = (event.aggregate_type.clone(), event.aggregate_id);
        {
            let positions = self.positions.read().await;
            if let Some(&last) = positions.get(&key) {
                if event.version <= last {
                    debug!(
                        projection.name = self.name(),
                        event.version = event.version,
                        projection.position = last,
                        "skipping already projected event"
                    );
                    return Ok(());
                }
            }
        }

        self.projection.project(event).await?;
        self.positions.write().await.insert(key, event.version);
        Ok(())
    }

    pub async fn reset(&self) {
        self.projection.reset().await;
        self.positions.write().await.clear();
    }
}

/// Adapts a tracked projection to the event bus subscriber interface.
struct ProjectionSubscriber {
    tracked: Arc<TrackedProjection>,
}

#[async_trait]
impl EventSubscriber for ProjectionSubscriber {
    fn name(&self) -> &str {
        self.tracked.name()
    }

    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        self.tracked.deliver(event).await
    }
}

/// Registers projections on the bus and rebuilds them from history.
pub struct ProjectionManager {
    bus: Arc<EventBus>,
    event_store: Arc<dyn EventStore>,
    projections: RwLock<Vec<Arc<TrackedProjection>>>,
}

impl ProjectionManager {
    pub fn new(bus: Arc<EventBus>, event_store: Arc<dyn EventStore>) -> Self {
        Self {
            bus,
            event_store,
            projections: RwLock::new(Vec::new()),
        }
    }

    /// Wrap a projection in position tracking and subscribe it to each
    /// of its event types.
    pub async fn register_projection(&self, projection: Arc<dyn Projection>) {
        let tracked = Arc::new(TrackedProjection::new(projection));
        for event_type in tracked.event_types() {
            self.bus
                .subscribe(
                    event_type,
                    Arc::new(ProjectionSubscriber {
                        tracked: Arc::clone(&tracked),
                    }),
                )
                .await;
        }
        info!(projection.name = tracked.name(), "projection registered");
        self.projections.write().await.push(tracked);
    }

    pub async fn reset_all(&self) {
        let projections = self.projections.read().await;
        for projection in projections.iter() {
            projection.reset().await;
        }
    }

    /// Reset every projection and replay all stored streams through
    /// them, in version order per stream.
    pub async fn rebuild(&self) -> Result<()> {
        self.reset_all().await;

        let projections = self.projections.read().await.clone();
        let streams = self.event_store.list_streams().await?;
        let mut replayed = 0usize;

        for (aggregate_id, aggregate_type) in streams {
            let events = self
                .event_store
                .read(aggregate_id, &aggregate_type, 1)
                .await?;
            for event in &events {
                for projection in &projections {
                    if projection.event_types().contains(&event.event_type.as_str()) {
                        projection.deliver(event).await?;
                    }
                }
                replayed += 1;
            }
        }

        info!(rebuild.events = replayed, "projection rebuild complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        projected: AtomicUsize,
        fail_next: AtomicUsize,
    }

    impl Counting {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                projected: AtomicUsize::new(0),
                fail_next: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Projection for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn event_types(&self) -> &'static [&'static str] {
            &["player.created", "player.level_gained"]
        }

        async fn project(&self, _event: &DomainEvent) -> Result<()> {
            if self.fail_next.load(Ordering::SeqCst) > 0 {
                self.fail_next.fetch_sub(1, Ordering::SeqCst);
                return Err(CoreError::Validation("transient".to_string()));
            }
            self.projected.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn reset(&self) {
            self.projected.store(0, Ordering::SeqCst);
        }
    }

    fn make_event(id: Uuid, version: u64) -> DomainEvent {
        DomainEvent::new(id, "player", "player.created", version, json!({}))
    }

    #[tokio::test]
    async fn test_redelivery_is_skipped() {
        let projection = Counting::new();
        let tracked = TrackedProjection::new(projection.clone());
        let id = Uuid::new_v4();

        let event = make_event(id, 1);
        tracked.deliver(&event).await.unwrap();
        tracked.deliver(&event).await.unwrap();

        assert_eq!(projection.projected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_version_is_skipped() {
        let projection = Counting::new();
        let tracked = TrackedProjection::new(projection.clone());
        let id = Uuid::new_v4();

        tracked.deliver(&make_event(id, 3)).await.unwrap();
        tracked.deliver(&make_event(id, 2)).await.unwrap();

        assert_eq!(projection.projected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_can_be_retried() {
        let projection = Counting::new();
        projection.fail_next.store(1, Ordering::SeqCst);
        let tracked = TrackedProjection::new(projection.clone());
        let id = Uuid::new_v4();

        let event = make_event(id, 1);
        assert!(tracked.deliver(&event).await.is_err());
        // position did not advance, so the retry projects
        tracked.deliver(&event).await.unwrap();
        assert_eq!(projection.projected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_positions_are_per_stream() {
        let projection = Counting::new();
        let tracked = TrackedProjection::new(projection.clone());

        tracked.deliver(&make_event(Uuid::new_v4(), 1)).await.unwrap();
        tracked.deliver(&make_event(Uuid::new_v4(), 1)).await.unwrap();

        assert_eq!(projection.projected.load(Ordering::SeqCst), 2);
    }
}
