//! In-memory storage backend.
//!
//! Honors the same contract as the SQLite backend. Used by tests and by
//! embedded deployments that do not need durability. The failure switches
//! let tests exercise `StoreUnavailable` paths.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::event::{DomainEvent, SnapshotRecord};
use crate::interfaces::{EventStore, SnapshotStore};

type StreamKey = (Uuid, String);

fn stream_key(aggregate_id: Uuid, aggregate_type: &str) -> StreamKey {
    (aggregate_id, aggregate_type.to_string())
}

/// In-memory event store.
#[derive(Default)]
pub struct MemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<DomainEvent>>>,
    fail_on_append: RwLock<bool>,
    fail_on_read: RwLock<bool>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append fail with `StoreUnavailable`.
    pub async fn set_fail_on_append(&self, fail: bool) {
        *self.fail_on_append.write().await = fail;
    }

    /// Make every subsequent read fail with `StoreUnavailable`.
    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        events: Vec<DomainEvent>,
        expected_version: u64,
    ) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        if *self.fail_on_append.read().await {
            return Err(CoreError::StoreUnavailable(
                "injected append failure".to_string(),
            ));
        }

        let mut streams = self.streams.write().await;
        let stream = streams
            .entry(stream_key(aggregate_id, aggregate_type))
            .or_default();

        let actual = stream.len() as u64;
        if actual != expected_version {
            return Err(CoreError::ConcurrencyConflict {
                aggregate_id,
                aggregate_type: aggregate_type.to_string(),
                expected: expected_version,
                actual,
            });
        }

        for (offset, mut event) in events.into_iter().enumerate() {
            event.version = expected_version + offset as u64 + 1;
            stream.push(event);
        }
        Ok(())
    }

    async fn read(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        from_version: u64,
    ) -> Result<Vec<DomainEvent>> {
        if *self.fail_on_read.read().await {
            return Err(CoreError::StoreUnavailable(
                "injected read failure".to_string(),
            ));
        }

        let streams = self.streams.read().await;
        Ok(streams
            .get(&stream_key(aggregate_id, aggregate_type))
            .map(|stream| {
                stream
                    .iter()
                    .filter(|e| e.version >= from_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn current_version(&self, aggregate_id: Uuid, aggregate_type: &str) -> Result<u64> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(&stream_key(aggregate_id, aggregate_type))
            .map(|stream| stream.len() as u64)
            .unwrap_or(0))
    }

    async fn list_streams(&self) -> Result<Vec<(Uuid, String)>> {
        let streams = self.streams.read().await;
        let mut keys: Vec<_> = streams
            .iter()
            .filter(|(_, events)| !events.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(keys)
    }

    async fn read_by_correlation(&self, correlation_id: Uuid) -> Result<Vec<DomainEvent>> {
        let streams = self.streams.read().await;
        let mut events: Vec<DomainEvent> = streams
            .values()
            .flatten()
            .filter(|e| e.correlation_id() == Some(correlation_id))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.version.cmp(&b.version)));
        Ok(events)
    }
}

/// In-memory snapshot store with latest-only retention.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<StreamKey, SnapshotRecord>>,
    fail_on_save: RwLock<bool>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail with `StoreUnavailable`.
    pub async fn set_fail_on_save(&self, fail: bool) {
        *self.fail_on_save.write().await = fail;
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: SnapshotRecord) -> Result<()> {
        if *self.fail_on_save.read().await {
            return Err(CoreError::StoreUnavailable(
                "injected save failure".to_string(),
            ));
        }
        let key = stream_key(snapshot.aggregate_id, &snapshot.aggregate_type);
        self.snapshots.write().await.insert(key, snapshot);
        Ok(())
    }

    async fn get_latest(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
    ) -> Result<Option<SnapshotRecord>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .get(&stream_key(aggregate_id, aggregate_type))
            .cloned())
    }

    async fn delete(&self, aggregate_id: Uuid, aggregate_type: &str) -> Result<()> {
        self.snapshots
            .write()
            .await
            .remove(&stream_key(aggregate_id, aggregate_type));
        Ok(())
    }
}
