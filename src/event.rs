//! Domain event and snapshot records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Optional tracing metadata attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Correlates all events of one workflow (e.g. a saga) across aggregates.
    pub correlation_id: Option<Uuid>,
    /// The event or command that directly caused this event.
    pub causation_id: Option<Uuid>,
}

/// An immutable fact about one aggregate.
///
/// Events for one aggregate are totally ordered by `version`; no two
/// events for the same aggregate share a version. Version numbers start
/// at 1 and are gapless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_type: String,
    /// The aggregate version this event produces.
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    /// Serialized event body.
    pub payload: Value,
    pub metadata: Option<EventMetadata>,
}

impl DomainEvent {
    /// Create an event with a fresh id and the current timestamp.
    pub fn new(
        aggregate_id: Uuid,
        aggregate_type: &str,
        event_type: &str,
        version: u64,
        payload: Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: event_type.to_string(),
            version,
            timestamp: Utc::now(),
            payload,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Correlation id from the metadata, if any.
    pub fn correlation_id(&self) -> Option<Uuid> {
        self.metadata.as_ref().and_then(|m| m.correlation_id)
    }
}

/// Point-in-time serialized aggregate state.
///
/// A snapshot at version V is only valid combined with the events with
/// `version > V`. It is a cache, never authoritative: it can be discarded
/// and rebuilt from the event store at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub version: u64,
    pub state: Value,
    pub created_at: DateTime<Utc>,
}

impl SnapshotRecord {
    pub fn new(aggregate_id: Uuid, aggregate_type: &str, version: u64, state: Value) -> Self {
        Self {
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            version,
            state,
            created_at: Utc::now(),
        }
    }
}
