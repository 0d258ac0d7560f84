//! Guild aggregate.

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::event::DomainEvent;

use super::Aggregate;

/// Events emitted by the guild aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuildEvent {
    Founded { name: String, max_members: u32 },
    MemberJoined { player_id: Uuid },
    MemberLeft { player_id: Uuid },
    Disbanded { reason: String },
}

impl GuildEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            GuildEvent::Founded { .. } => "guild.founded",
            GuildEvent::MemberJoined { .. } => "guild.member_joined",
            GuildEvent::MemberLeft { .. } => "guild.member_left",
            GuildEvent::Disbanded { .. } => "guild.disbanded",
        }
    }
}

/// Materialized guild state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildState {
    pub name: Option<String>,
    pub max_members: u32,
    pub members: Vec<Uuid>,
    pub disbanded: bool,
}

/// A guild: founded once with a member capacity, tracks membership, and
/// disbanding is terminal.
#[derive(Debug)]
pub struct Guild {
    id: Uuid,
    version: u64,
    uncommitted: Vec<DomainEvent>,
    state: GuildState,
}

impl Guild {
    pub const TYPE: &'static str = "guild";

    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            uncommitted: Vec::new(),
            state: GuildState::default(),
        }
    }

    pub fn state(&self) -> &GuildState {
        &self.state
    }

    pub fn found(&mut self, name: &str, max_members: u32) -> Result<()> {
        if self.exists() {
            return Err(CoreError::Validation("guild already exists".to_string()));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation(
                "guild name must not be empty".to_string(),
            ));
        }
        if max_members == 0 {
            return Err(CoreError::Validation(
                "guild capacity must be positive".to_string(),
            ));
        }
        self.raise(GuildEvent::Founded {
            name: name.to_string(),
            max_members,
        })
    }

    pub fn join(&mut self, player_id: Uuid) -> Result<()> {
        self.require_active()?;
        if self.state.members.contains(&player_id) {
            return Err(CoreError::Validation(
                "player is already a member".to_string(),
            ));
        }
        if self.state.members.len() as u32 >= self.state.max_members {
            return Err(CoreError::Validation("guild is full".to_string()));
        }
        self.raise(GuildEvent::MemberJoined { player_id })
    }

    pub fn leave(&mut self, player_id: Uuid) -> Result<()> {
        self.require_active()?;
        if !self.state.members.contains(&player_id) {
            return Err(CoreError::Validation("player is not a member".to_string()));
        }
        self.raise(GuildEvent::MemberLeft { player_id })
    }

    pub fn disband(&mut self, reason: &str) -> Result<()> {
        self.require_active()?;
        self.raise(GuildEvent::Disbanded {
            reason: reason.to_string(),
        })
    }

    fn exists(&self) -> bool {
        self.version > 0 || !self.uncommitted.is_empty()
    }

    fn require_active(&self) -> Result<()> {
        if !self.exists() {
            return Err(CoreError::Validation("guild does not exist".to_string()));
        }
        if self.state.disbanded {
            return Err(CoreError::Validation("guild is disbanded".to_string()));
        }
        Ok(())
    }

    fn raise(&mut self, event: GuildEvent) -> Result<()> {
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

    fn mutate(&mut self, event: &GuildEvent) {
        match event {
            GuildEvent::Founded { name, max_members } => {
                self.state.name = Some(name.clone());
                self.state.max_members = *max_members;
            }
            GuildEvent::MemberJoined { player_id } => {
                self.state.members.push(*player_id);
            }
            GuildEvent::MemberLeft { player_id } => {
                self.state.members.retain(|m| m != player_id);
            }
            GuildEvent::Disbanded { .. } => {
                self.state.disbanded = true;
            }
        }
    }
}

impl Aggregate for Guild {
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
        let parsed: GuildEvent =
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

#[cfg(test)]
mod tests {
    use super::*;

    fn founded_guild(max_members: u32) -> Guild {
        let mut guild = Guild::new(Uuid::new_v4());
        guild.found("zion", max_members).unwrap();
        guild
    }

    #[test]
    fn test_found_validates_name_and_capacity() {
        let mut guild = Guild::new(Uuid::new_v4());
        assert!(guild.found("  ", 10).is_err());
        assert!(guild.found("zion", 0).is_err());
        guild.found("zion", 10).unwrap();
        assert!(guild.found("nebuchadnezzar", 5).is_err());
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut guild = founded_guild(2);
        guild.join(Uuid::new_v4()).unwrap();
        guild.join(Uuid::new_v4()).unwrap();

        let err = guild.join(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(guild.state().members.len(), 2);
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let mut guild = founded_guild(10);
        let player = Uuid::new_v4();
        guild.join(player).unwrap();
        assert!(guild.join(player).is_err());
    }

    #[test]
    fn test_leave_requires_membership() {
        let mut guild = founded_guild(10);
        let player = Uuid::new_v4();
        assert!(guild.leave(player).is_err());

        guild.join(player).unwrap();
        guild.leave(player).unwrap();
        assert!(guild.state().members.is_empty());
    }

    #[test]
    fn test_leaving_frees_a_slot() {
        let mut guild = founded_guild(1);
        let first = Uuid::new_v4();
        guild.join(first).unwrap();
        guild.leave(first).unwrap();
        guild.join(Uuid::new_v4()).unwrap();
    }

    #[test]
    fn test_disband_is_terminal() {
        let mut guild = founded_guild(10);
        guild.disband("inactive").unwrap();

        assert!(guild.join(Uuid::new_v4()).is_err());
        assert!(guild.disband("again").is_err());
    }

    #[test]
    fn test_replay_rebuilds_membership() {
        let id = Uuid::new_v4();
        let mut original = Guild::new(id);
        let stayer = Uuid::new_v4();
        let leaver = Uuid::new_v4();
        original.found("zion", 10).unwrap();
        original.join(stayer).unwrap();
        original.join(leaver).unwrap();
        original.leave(leaver).unwrap();
        let events = original.take_uncommitted();

        let mut replayed = Guild::new(id);
        for event in &events {
            replayed.apply(event).unwrap();
        }
        assert_eq!(replayed.version(), 4);
        assert_eq!(replayed.state().members, vec![stayer]);
    }
}
