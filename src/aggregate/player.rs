//! Player aggregate.

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::event::DomainEvent;

use super::Aggregate;

/// Events emitted by the player aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlayerEvent {
    Created { username: String },
    LevelGained { new_level: u32 },
    Renamed { username: String },
    Banned { reason: String },
}

impl PlayerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::Created { .. } => "player.created",
            PlayerEvent::LevelGained { .. } => "player.level_gained",
            PlayerEvent::Renamed { .. } => "player.renamed",
            PlayerEvent::Banned { .. } => "player.banned",
        }
    }
}

/// Materialized player state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerState {
    pub username: Option<String>,
    pub level: u32,
    pub banned: bool,
}

/// A player account: created once, levels strictly upward, and a ban is
/// terminal for further commands.
#[derive(Debug)]
pub struct Player {
    id: Uuid,
    version: u64,
    uncommitted: Vec<DomainEvent>,
    state: PlayerState,
}

impl Player {
    pub const TYPE: &'static str = "player";

    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            uncommitted: Vec::new(),
            state: PlayerState::default(),
        }
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn create(&mut self, username: &str) -> Result<()> {
        if self.exists() {
            return Err(CoreError::Validation("player already exists".to_string()));
        }
        let username = username.trim();
        if username.is_empty() {
            return Err(CoreError::Validation(
                "username must not be empty".to_string(),
            ));
        }
        self.raise(PlayerEvent::Created {
            username: username.to_string(),
        })
    }

    pub fn gain_level(&mut self, new_level: u32) -> Result<()> {
        self.require_active()?;
        if new_level <= self.state.level {
            return Err(CoreError::Validation(format!(
                "level must increase: {} -> {new_level}",
                self.state.level
            )));
        }
        self.raise(PlayerEvent::LevelGained { new_level })
    }

    pub fn rename(&mut self, username: &str) -> Result<()> {
        self.require_active()?;
        let username = username.trim();
        if username.is_empty() {
            return Err(CoreError::Validation(
                "username must not be empty".to_string(),
            ));
        }
        self.raise(PlayerEvent::Renamed {
            username: username.to_string(),
        })
    }

    pub fn ban(&mut self, reason: &str) -> Result<()> {
        self.require_active()?;
        self.raise(PlayerEvent::Banned {
            reason: reason.to_string(),
        })
    }

    fn exists(&self) -> bool {
        self.version > 0 || !self.uncommitted.is_empty()
    }

    fn require_active(&self) -> Result<()> {
        if !self.exists() {
            return Err(CoreError::Validation("player does not exist".to_string()));
        }
        if self.state.banned {
            return Err(CoreError::Validation("player is banned".to_string()));
        }
        Ok(())
    }

    /// Stage a new event: assign the next version past any already staged
    /// events, mutate state, and queue it for persistence.
    fn raise(&mut self, event: PlayerEvent) -> Result<()> {
        let version = self.version + self.uncommitted.len() as u64 + 1;
        let domain_event = DomainEvent::new(
            self.id,
            Self::TYPE,
            event.event_type(),
            version,
            serde_json::to_value(&event)?,
        );
        self.mutate(&event);
        self.uncommitted.push(domain_event);
        Ok(())
    }

    fn mutate(&mut self, event: &PlayerEvent) {
        match event {
            PlayerEvent::Created { username } => {
                self.state.username = Some(username.clone());
                self.state.level = 1;
            }
            PlayerEvent::LevelGained { new_level } => {
                self.state.level = *new_level;
            }
            PlayerEvent::Renamed { username } => {
                self.state.username = Some(username.clone());
            }
            PlayerEvent::Banned { .. } => {
                self.state.banned = true;
            }
        }
    }
}

impl Aggregate for Player {
    fn aggregate_type(&self) -> &'static str {
        Self::TYPE
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &DomainEvent) -> Result<()> {
        let parsed: PlayerEvent =
            serde_json::from_value(event.payload.clone()).map_err(|_| {
                CoreError::UnknownEventType {
                    aggregate_type: Self::TYPE.to_string(),
                    event_type: event.event_type.clone(),
                }
            })?;
        self.mutate(&parsed);
        self.version = event.version;
        Ok(())
    }

    fn uncommitted_events(&self) -> &[DomainEvent] {
        &self.uncommitted
    }

    fn take_uncommitted(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.uncommitted)
    }

    fn mark_committed(&mut self, version: u64) {
        self.version = version;
    }

    fn snapshot_state(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.state)?)
    }

    fn restore(&mut self, version: u64, state: &Value) -> Result<()> {
        self.state = serde_json::from_value(state.clone())?;
        self.version = version;
        self.uncommitted.clear();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
