//! Chronicle - event-sourcing and coordination core.
//!
//! The persistence backbone of the game platform backend: an append-only
//! event store with optimistic concurrency, snapshot-bounded aggregate
//! replay, in-process command/event buses, idempotent read-model
//! projections, and a saga coordinator with compensating rollback.
//!
//! The surrounding REST services (crafting, guild pages, tournaments, ...)
//! consume this crate through the repository, the buses, and the saga
//! coordinator; they never touch the stores directly.

pub mod aggregate;
pub mod bootstrap;
pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod handlers;
pub mod interfaces;
pub mod projection;
pub mod repository;
pub mod retry;
pub mod runtime;
pub mod saga;
pub mod storage;

pub use config::Config;
pub use error::{CoreError, Result};
pub use event::{DomainEvent, EventMetadata, SnapshotRecord};
pub use runtime::CoreRuntime;
