//! Storage backends for events and snapshots.

pub mod memory;
pub mod schema;
pub mod sqlite;

use std::path::Path;
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;

use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::interfaces::{EventStore, SnapshotStore};

pub use memory::{MemoryEventStore, MemorySnapshotStore};
pub use sqlite::{SqliteEventStore, SqliteSnapshotStore};

/// Construct the event and snapshot stores named by the configuration.
pub async fn init_storage(
    config: &Config,
) -> Result<(Arc<dyn EventStore>, Arc<dyn SnapshotStore>)> {
    match config.storage.storage_type.as_str() {
        "sqlite" => {
            let path = &config.storage.path;
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        CoreError::StoreUnavailable(format!(
                            "cannot create storage directory: {e}"
                        ))
                    })?;
                }
            }

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&format!("sqlite:{path}?mode=rwc"))
                .await?;

            let event_store = SqliteEventStore::new(pool.clone());
            event_store.init().await?;
            let snapshot_store = SqliteSnapshotStore::new(pool);
            snapshot_store.init().await?;

            info!(storage.path = %path, "sqlite storage initialized");
            Ok((Arc::new(event_store), Arc::new(snapshot_store)))
        }
        "memory" => {
            info!("in-memory storage initialized");
            Ok((
                Arc::new(MemoryEventStore::new()),
                Arc::new(MemorySnapshotStore::new()),
            ))
        }
        other => Err(CoreError::UnknownStorageType(other.to_string())),
    }
}
