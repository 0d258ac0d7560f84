//! Event storage interface.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::event::DomainEvent;

/// Interface for event persistence.
///
/// One ordered stream per `(aggregate_id, aggregate_type)`. The stored
/// version sequence is gapless and starts at 1; an aggregate with no
/// events does not exist yet.
///
/// Implementations:
/// - `SqliteEventStore`: durable storage
/// - `MemoryEventStore`: tests and embedded use
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a batch of events to an aggregate's stream.
    ///
    /// The whole batch commits atomically or not at all. Events are
    /// assigned versions `expected_version + 1, + 2, ...` in order. If the
    /// stream's current version is not `expected_version` - or a racing
    /// writer wins the underlying uniqueness constraint - the append fails
    /// with [`crate::CoreError::ConcurrencyConflict`].
    async fn append(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        events: Vec<DomainEvent>,
        expected_version: u64,
    ) -> Result<()>;

    /// Read events with `version >= from_version`, in strictly increasing
    /// version order. A non-existent aggregate yields an empty sequence,
    /// not an error.
    async fn read(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        from_version: u64,
    ) -> Result<Vec<DomainEvent>>;

    /// Current version of an aggregate's stream (0 if it does not exist).
    async fn current_version(&self, aggregate_id: Uuid, aggregate_type: &str) -> Result<u64>;

    /// All `(aggregate_id, aggregate_type)` streams with at least one
    /// event. Used to replay the whole store when rebuilding projections.
    async fn list_streams(&self) -> Result<Vec<(Uuid, String)>>;

    /// Events across all aggregates sharing a correlation id, ordered by
    /// timestamp. Traces a saga's effects across aggregates.
    async fn read_by_correlation(&self, correlation_id: Uuid) -> Result<Vec<DomainEvent>>;
}
