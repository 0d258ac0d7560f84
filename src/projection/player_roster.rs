//! Player roster read model.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::aggregate::PlayerEvent;
use crate::error::Result;
use crate::event::DomainEvent;

use super::Projection;

/// One roster row per player.
#[derive(Debug, Clone, Default)]
pub struct RosterEntry {
    pub username: String,
    pub level: u32,
    pub banned: bool,
}

/// In-memory roster of all players, keyed by player id.
#[derive(Default)]
pub struct PlayerRoster {
    entries: RwLock<HashMap<Uuid, RosterEntry>>,
}

impl PlayerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, player_id: Uuid) -> Option<RosterEntry> {
        self.entries.read().await.get(&player_id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Players at or above the given level, unbanned only.
    pub async fn at_least_level(&self, level: u32) -> Vec<(Uuid, RosterEntry)> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| !entry.banned && entry.level >= level)
            .map(|(id, entry)| (*id, entry.clone()))
            .collect()
    }
}

#[async_trait]
impl Projection for PlayerRoster {
    fn name(&self) -> &str {
        "player_roster"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[
            "player.created",
            "player.level_gained",
            "player.renamed",
            "player.banned",
        ]
    }

    async fn project(&self, event: &DomainEvent) -> Result<()> {
        let parsed: PlayerEvent = serde_json::from_value(event.payload.clone())?;
        let mut entries = self.entries.write().await;
        let entry = entries.entry(event.aggregate_id).or_default();
        match parsed {
            PlayerEvent::Created { username } => {
                entry.username = username;
                entry.level = 1;
            }
            PlayerEvent::LevelGained { new_level } => {
                entry.level = new_level;
            }
            PlayerEvent::Renamed { username } => {
                entry.username = username;
            }
            PlayerEvent::Banned { .. } => {
                entry.banned = true;
            }
        }
        Ok(())
    }

    async fn reset(&self) {
        self.entries.write().await.clear();
    }
}
