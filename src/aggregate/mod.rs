//! Aggregate trait and registry.
//!
//! An aggregate is a consistency boundary rebuilt by folding its event
//! stream. Command methods validate against current state and stage new
//! events; the repository persists staged events and confirms them with
//! [`Aggregate::mark_committed`].

mod guild;
mod player;

use std::any::Any;
use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::event::DomainEvent;

pub use guild::{Guild, GuildEvent, GuildState};
pub use player::{Player, PlayerEvent, PlayerState};

/// A domain aggregate rebuilt from its event stream.
pub trait Aggregate: Send + Sync + std::fmt::Debug {
    /// The stream type name, e.g. `"player"`.
    fn aggregate_type(&self) -> &'static str;

    /// The aggregate's identity.
    fn id(&self) -> Uuid;

    /// The last persisted version. Zero for an aggregate with no
    /// committed events.
    fn version(&self) -> u64;

    /// Fold one persisted event into state. Used during load; must not
    /// perform validation.
    fn apply(&mut self, event: &DomainEvent) -> Result<()>;

    /// Events staged by command methods but not yet persisted.
    fn uncommitted_events(&self) -> &[DomainEvent];

    /// Drain the staged events for persistence.
    fn take_uncommitted(&mut self) -> Vec<DomainEvent>;

    /// Confirm persistence up to `version`.
    fn mark_committed(&mut self, version: u64);

    /// Serialize current state for snapshotting.
    fn snapshot_state(&self) -> Result<Value>;

    /// Restore state from a snapshot taken at `version`.
    fn restore(&mut self, version: u64, state: &Value) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

type AggregateFactory = fn(Uuid) -> Box<dyn Aggregate>;

/// Maps aggregate type names to constructors so the repository can
/// rebuild any registered aggregate from storage.
#[derive(Default)]
pub struct AggregateRegistry {
    factories: HashMap<&'static str, AggregateFactory>,
}

impl AggregateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under a type name. Later registrations
    /// replace earlier ones.
    pub fn register(&mut self, aggregate_type: &'static str, factory: AggregateFactory) {
        self.factories.insert(aggregate_type, factory);
    }

    /// Instantiate an empty aggregate of the given type.
    pub fn create(&self, aggregate_type: &str, id: Uuid) -> Result<Box<dyn Aggregate>> {
        self.factories
            .get(aggregate_type)
            .map(|factory| factory(id))
            .ok_or_else(|| CoreError::UnknownAggregateType(aggregate_type.to_string()))
    }

    /// Registry preloaded with the game platform aggregates.
    pub fn game_platform() -> Self {
        let mut registry = Self::new();
        registry.register(Player::TYPE, |id| Box::new(Player::new(id)));
        registry.register(Guild::TYPE, |id| Box::new(Guild::new(id)));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creates_registered_aggregates() {
        let registry = AggregateRegistry::game_platform();
        let id = Uuid::new_v4();

        let player = registry.create("player", id).unwrap();
        assert_eq!(player.aggregate_type(), "player");
        assert_eq!(player.id(), id);
        assert_eq!(player.version(), 0);

        let guild = registry.create("guild", id).unwrap();
        assert_eq!(guild.aggregate_type(), "guild");
    }

    #[test]
    fn test_registry_rejects_unknown_type() {
        let registry = AggregateRegistry::game_platform();
        let err = registry.create("spaceship", Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, CoreError::UnknownAggregateType(t) if t == "spaceship"));
    }
}
