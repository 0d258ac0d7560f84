//! Command handlers wiring aggregates to the buses.
//!
//! Each handler follows the same shape: load the aggregate, dispatch to
//! a command method, save, publish the persisted events. Concurrency
//! conflicts are retried with backoff; the reload inside the retry picks
//! up the winning writer's events.

mod guild;
mod player;

pub use guild::{DisbandGuild, FoundGuild, GuildCommandHandler, JoinGuild, LeaveGuild};
pub use player::{BanPlayer, CreatePlayer, GainLevel, PlayerCommandHandler, RenamePlayer};
