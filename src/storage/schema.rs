//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Events table schema.
#[derive(Iden)]
pub enum Events {
    Table,
    #[iden = "event_id"]
    EventId,
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "aggregate_type"]
    AggregateType,
    #[iden = "event_type"]
    EventType,
    #[iden = "version"]
    Version,
    #[iden = "payload"]
    Payload,
    #[iden = "metadata"]
    Metadata,
    #[iden = "correlation_id"]
    CorrelationId,
    #[iden = "event_timestamp"]
    EventTimestamp,
}

/// Snapshots table schema.
#[derive(Iden)]
pub enum Snapshots {
    Table,
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "aggregate_type"]
    AggregateType,
    #[iden = "version"]
    Version,
    #[iden = "state_data"]
    StateData,
    #[iden = "created_at"]
    CreatedAt,
}

/// SQL for creating the events table.
///
/// The primary key on `(aggregate_id, aggregate_type, version)` is what
/// the optimistic-concurrency check relies on: when two writers race, the
/// loser's batch insert fails uniqueness and is translated into a
/// `ConcurrencyConflict`.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    event_id TEXT NOT NULL UNIQUE,
    aggregate_id TEXT NOT NULL,
    aggregate_type TEXT NOT NULL,
    event_type TEXT NOT NULL,
    version INTEGER NOT NULL CHECK (version > 0),
    payload TEXT NOT NULL,
    metadata TEXT,
    correlation_id TEXT,
    event_timestamp TEXT NOT NULL,
    PRIMARY KEY (aggregate_id, aggregate_type, version)
);

CREATE INDEX IF NOT EXISTS idx_events_type_time ON events(event_type, event_timestamp);
CREATE INDEX IF NOT EXISTS idx_events_correlation ON events(correlation_id);
"#;

/// SQL for creating the snapshots table.
///
/// The primary key covers only the aggregate identity, so saving a
/// snapshot replaces the previous one: latest-only retention.
pub const CREATE_SNAPSHOTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    aggregate_id TEXT NOT NULL,
    aggregate_type TEXT NOT NULL,
    version INTEGER NOT NULL,
    state_data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (aggregate_id, aggregate_type)
);
"#;
