//! SQLite storage backend.

mod event_store;
mod snapshot_store;

pub use event_store::SqliteEventStore;
pub use snapshot_store::SqliteSnapshotStore;
