//! Abstract interfaces for the core's storage seams.
//!
//! These traits define the contracts for:
//! - Event persistence (the sole source of truth)
//! - Snapshot persistence (disposable replay optimization)

pub mod event_store;
pub mod snapshot_store;

pub use event_store::EventStore;
pub use snapshot_store::SnapshotStore;
