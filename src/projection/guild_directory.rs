//! Guild directory read model.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::aggregate::GuildEvent;
use crate::error::Result;
use crate::event::DomainEvent;

use super::Projection;

/// One directory row per guild.
#[derive(Debug, Clone, Default)]
pub struct GuildEntry {
    pub name: String,
    pub max_members: u32,
    pub member_count: u32,
    pub disbanded: bool,
}

/// In-memory directory of all guilds, keyed by guild id.
#[derive(Default)]
pub struct GuildDirectory {
    entries: RwLock<HashMap<Uuid, GuildEntry>>,
}

impl GuildDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, guild_id: Uuid) -> Option<GuildEntry> {
        self.entries.read().await.get(&guild_id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Active guilds with room for another member.
    pub async fn open_guilds(&self) -> Vec<(Uuid, GuildEntry)> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| !entry.disbanded && entry.member_count < entry.max_members)
            .map(|(id, entry)| (*id, entry.clone()))
            .collect()
    }
}

#[async_trait]
impl Projection for GuildDirectory {
    fn name(&self) -> &str {
        "guild_directory"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[
            "guild.founded",
            "guild.member_joined",
            "guild.member_left",
            "guild.disbanded",
        ]
    }

    async fn project(&self, event: &DomainEvent) -> Result<()> {
        let parsed: GuildEvent = serde_json::from_value(event.payload.clone())?;
        let mut entries = self.entries.write().await;
        let entry = entries.entry(event.aggregate_id).or_default();
        match parsed {
            GuildEvent::Founded { name, max_members } => {
                entry.name = name;
                entry.max_members = max_members;
            }
            GuildEvent::MemberJoined { .. } => {
                entry.member_count += 1;
            }
            GuildEvent::MemberLeft { .. } => {
                entry.member_count = entry.member_count.saturating_sub(1);
            }
            GuildEvent::Disbanded { .. } => {
                entry.disbanded = true;
            }
        }
        Ok(())
    }

    async fn reset(&self) {
        self.entries.write().await.clear();
    }
}
