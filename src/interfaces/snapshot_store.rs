//! Snapshot storage interface.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::event::SnapshotRecord;

/// Interface for snapshot persistence.
///
/// Snapshots bound replay cost when loading an aggregate: the repository
/// restores the snapshot state, then folds only the events with
/// `version > snapshot.version`. A missing or stale snapshot costs extra
/// replay time, never correctness.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store a snapshot, replacing any existing one for the aggregate.
    /// Only the most recent snapshot per aggregate is retained.
    async fn save(&self, snapshot: SnapshotRecord) -> Result<()>;

    /// Latest snapshot for an aggregate, or `None`.
    async fn get_latest(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
    ) -> Result<Option<SnapshotRecord>>;

    /// Drop the snapshot for an aggregate. The next load replays the full
    /// stream and the next save threshold re-creates it.
    async fn delete(&self, aggregate_id: Uuid, aggregate_type: &str) -> Result<()>;
}
