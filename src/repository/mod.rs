//! Aggregate repository: load, save, snapshot, cache.
//!
//! Loading prefers the freshest starting point (cache, then snapshot,
//! then empty) and always folds every event strictly newer than it, so a
//! stale cache entry or snapshot can never produce stale state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::aggregate::{Aggregate, AggregateRegistry};
use crate::error::Result;
use crate::event::{DomainEvent, SnapshotRecord};
use crate::interfaces::{EventStore, SnapshotStore};

/// Tuning knobs for the repository.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Write a snapshot each time a stream crosses a multiple of this
    /// many events. Zero disables snapshotting.
    pub snapshot_every: u64,
    /// How long a cache entry stays usable.
    pub cache_ttl: Duration,
    /// How often the background sweeper evicts expired entries.
    pub cache_sweep_interval: Duration,
    /// Whether `load` consults the snapshot store. Disable to force full
    /// replay, e.g. to verify snapshot equivalence.
    pub snapshot_read: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            snapshot_every: 50,
            cache_ttl: Duration::from_secs(300),
            cache_sweep_interval: Duration::from_secs(60),
            snapshot_read: true,
        }
    }
}

struct CacheEntry {
    version: u64,
    state: Value,
    cached_at: Instant,
}

/// Rebuilds aggregates from storage and persists their staged events.
pub struct AggregateRepository {
    event_store: Arc<dyn EventStore>,
    snapshot_store: Arc<dyn SnapshotStore>,
    registry: Arc<AggregateRegistry>,
    cache: RwLock<HashMap<(String, Uuid), CacheEntry>>,
    config: RepositoryConfig,
}

impl AggregateRepository {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        snapshot_store: Arc<dyn SnapshotStore>,
        registry: Arc<AggregateRegistry>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            event_store,
            snapshot_store,
            registry,
            cache: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Rebuild an aggregate: start from the cache or latest snapshot and
    /// fold every newer event on top.
    pub async fn load(&self, aggregate_type: &str, id: Uuid) -> Result<Box<dyn Aggregate>> {
        let mut aggregate = self.registry.create(aggregate_type, id)?;

        let restored = self.restore_from_cache(&mut aggregate).await?;
        if !restored && self.config.snapshot_read {
            if let Some(snapshot) = self.snapshot_store.get_latest(id, aggregate_type).await? {
                aggregate.restore(snapshot.version, &snapshot.state)?;
                debug!(
                    aggregate.id = %id,
                    aggregate.aggregate_type = aggregate_type,
                    snapshot.version = snapshot.version,
                    "restored from snapshot"
                );
            }
        }

        let events = self
            .event_store
            .read(id, aggregate_type, aggregate.version() + 1)
            .await?;
        for event in &events {
            aggregate.apply(event)?;
        }

        self.cache_put(aggregate.as_ref()).await?;
        Ok(aggregate)
    }

    /// Persist the aggregate's staged events with an optimistic
    /// expected-version check, then trigger snapshotting if the stream
    /// crossed a snapshot boundary.
    pub async fn save(&self, aggregate: &mut dyn Aggregate) -> Result<Vec<DomainEvent>> {
        let events = aggregate.take_uncommitted();
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let expected = aggregate.version();
        let new_version = expected + events.len() as u64;

        self.event_store
            .append(aggregate.id(), aggregate.aggregate_type(), events.clone(), expected)
            .await?;
        aggregate.mark_committed(new_version);
        self.cache_put(aggregate).await?;

        if crosses_snapshot_boundary(expected, new_version, self.config.snapshot_every) {
            self.spawn_snapshot(aggregate)?;
        }

        // persisted copies carry the versions the store assigned, which
        // match what we staged; hand them back for publication
        Ok(events)
    }

    /// Write a snapshot of the aggregate's current state immediately.
    pub async fn write_snapshot(&self, aggregate: &dyn Aggregate) -> Result<()> {
        let record = SnapshotRecord::new(
            aggregate.id(),
            aggregate.aggregate_type(),
            aggregate.version(),
            aggregate.snapshot_state()?,
        );
        self.snapshot_store.save(record).await
    }

    /// Snapshot in the background. A failed snapshot is logged and
    /// dropped; the events are already durable.
    fn spawn_snapshot(&self, aggregate: &dyn Aggregate) -> Result<()> {
        let record = SnapshotRecord::new(
            aggregate.id(),
            aggregate.aggregate_type(),
            aggregate.version(),
            aggregate.snapshot_state()?,
        );
        let store = Arc::clone(&self.snapshot_store);
        tokio::spawn(async move {
            let id = record.aggregate_id;
            let aggregate_type = record.aggregate_type.clone();
            let version = record.version;
            if let Err(e) = store.save(record).await {
                warn!(
                    aggregate.id = %id,
                    aggregate.aggregate_type = %aggregate_type,
                    snapshot.version = version,
                    error = %e,
                    "snapshot write failed"
                );
            }
        });
        Ok(())
    }

    async fn restore_from_cache(&self, aggregate: &mut Box<dyn Aggregate>) -> Result<bool> {
        let key = (aggregate.aggregate_type().to_string(), aggregate.id());
        let cache = self.cache.read().await;
        if let Some(entry) = cache.get(&key) {
            if entry.cached_at.elapsed() < self.config.cache_ttl {
                aggregate.restore(entry.version, &entry.state)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn cache_put(&self, aggregate: &dyn Aggregate) -> Result<()> {
        let key = (aggregate.aggregate_type().to_string(), aggregate.id());
        let entry = CacheEntry {
            version: aggregate.version(),
            state: aggregate.snapshot_state()?,
            cached_at: Instant::now(),
        };
        self.cache.write().await.insert(key, entry);
        Ok(())
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    /// Background worker that evicts expired cache entries until the
    /// shutdown signal fires.
    pub fn spawn_cache_sweeper(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let repository = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(repository.config.cache_sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let ttl = repository.config.cache_ttl;
                        let mut cache = repository.cache.write().await;
                        let before = cache.len();
                        cache.retain(|_, entry| entry.cached_at.elapsed() < ttl);
                        let evicted = before - cache.len();
                        if evicted > 0 {
                            debug!(cache.evicted = evicted, "cache sweep");
                        }
                    }
                    _ = shutdown.changed() => {
                        debug!("cache sweeper stopping");
                        return;
                    }
                }
            }
        })
    }
}

/// True when appending past `expected` up to `new_version` crosses a
/// multiple of `every`.
fn crosses_snapshot_boundary(expected: u64, new_version: u64, every: u64) -> bool {
    every > 0 && expected / every < new_version / every
}
