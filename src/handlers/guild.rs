//! Guild commands and their handler.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use backon::Retryable;
use tracing::warn;
use uuid::Uuid;

use crate::aggregate::Guild;
use crate::bus::{Command, CommandBus, CommandHandler, EventBus};
use crate::error::{CoreError, Result};
use crate::repository::AggregateRepository;
use crate::retry::conflict_backoff;

pub struct FoundGuild {
    pub guild_id: Uuid,
    pub name: String,
    pub max_members: u32,
}

pub struct JoinGuild {
    pub guild_id: Uuid,
    pub player_id: Uuid,
}

pub struct LeaveGuild {
    pub guild_id: Uuid,
    pub player_id: Uuid,
}

pub struct DisbandGuild {
    pub guild_id: Uuid,
    pub reason: String,
}

macro_rules! guild_command {
    ($ty:ty, $command_type:literal) => {
        impl Command for $ty {
            fn command_type(&self) -> &'static str {
                $command_type
            }

            fn aggregate_id(&self) -> Uuid {
                self.guild_id
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

guild_command!(FoundGuild, "guild.found");
guild_command!(JoinGuild, "guild.join");
guild_command!(LeaveGuild, "guild.leave");
guild_command!(DisbandGuild, "guild.disband");

/// Handles all guild commands.
pub struct GuildCommandHandler {
    repository: Arc<AggregateRepository>,
    event_bus: Arc<EventBus>,
}

impl GuildCommandHandler {
    pub fn new(repository: Arc<AggregateRepository>, event_bus: Arc<EventBus>) -> Self {
        Self {
            repository,
            event_bus,
        }
    }

    /// Register this handler for every guild command type.
    pub async fn register(self: Arc<Self>, bus: &CommandBus) -> Result<()> {
        for command_type in ["guild.found", "guild.join", "guild.leave", "guild.disband"] {
            bus.register_handler(command_type, self.clone()).await?;
        }
        Ok(())
    }

    async fn execute(&self, command: &dyn Command) -> Result<()> {
        let mut aggregate = self
            .repository
            .load(Guild::TYPE, command.aggregate_id())
            .await?;
        let guild = aggregate
            .as_any_mut()
            .downcast_mut::<Guild>()
            .ok_or_else(|| CoreError::UnknownAggregateType(Guild::TYPE.to_string()))?;

        match command.command_type() {
            "guild.found" => {
                let cmd = downcast::<FoundGuild>(command)?;
                guild.found(&cmd.name, cmd.max_members)?;
            }
            "guild.join" => {
                let cmd = downcast::<JoinGuild>(command)?;
                guild.join(cmd.player_id)?;
            }
            "guild.leave" => {
                let cmd = downcast::<LeaveGuild>(command)?;
                guild.leave(cmd.player_id)?;
            }
            "guild.disband" => {
                let cmd = downcast::<DisbandGuild>(command)?;
                guild.disband(&cmd.reason)?;
            }
            other => return Err(CoreError::HandlerNotFound(other.to_string())),
        }

        let events = self.repository.save(aggregate.as_mut()).await?;
        for event in &events {
            if let Err(e) = self.event_bus.publish(event).await {
                warn!(event.event_type = %event.event_type, error = %e, "publish failed");
            }
        }
        Ok(())
    }
}

fn downcast<T: 'static>(command: &dyn Command) -> Result<&T> {
    command
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| CoreError::HandlerNotFound(command.command_type().to_string()))
}

#[async_trait]
impl CommandHandler for GuildCommandHandler {
    async fn handle(&self, command: &dyn Command) -> Result<()> {
        (|| self.execute(command))
            .retry(conflict_backoff())
            .when(|e: &CoreError| matches!(e, CoreError::ConcurrencyConflict { .. }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateRegistry;
    use crate::repository::RepositoryConfig;
    use crate::storage::{MemoryEventStore, MemorySnapshotStore};

    fn make_handler() -> (Arc<GuildCommandHandler>, Arc<AggregateRepository>) {
        let repository = Arc::new(AggregateRepository::new(
            Arc::new(MemoryEventStore::new()),
            Arc::new(MemorySnapshotStore::new()),
            Arc::new(AggregateRegistry::game_platform()),
            RepositoryConfig::default(),
        ));
        let handler = Arc::new(GuildCommandHandler::new(
            Arc::clone(&repository),
            Arc::new(EventBus::new()),
        ));
        (handler, repository)
    }

    #[tokio::test]
    async fn test_found_and_join_persist_membership() {
        let (handler, repository) = make_handler();
        let guild_id = Uuid::new_v4();
        let player_id = Uuid::new_v4();

        handler
            .handle(&FoundGuild {
                guild_id,
                name: "zion".to_string(),
                max_members: 10,
            })
            .await
            .unwrap();
        handler
            .handle(&JoinGuild {
                guild_id,
                player_id,
            })
            .await
            .unwrap();

        let loaded = repository.load("guild", guild_id).await.unwrap();
        let guild = loaded.as_any().downcast_ref::<Guild>().unwrap();
        assert_eq!(guild.state().members, vec![player_id]);
    }

    #[tokio::test]
    async fn test_full_guild_rejects_join() {
        let (handler, _) = make_handler();
        let guild_id = Uuid::new_v4();

        handler
            .handle(&FoundGuild {
                guild_id,
                name: "zion".to_string(),
                max_members: 1,
            })
            .await
            .unwrap();
        handler
            .handle(&JoinGuild {
                guild_id,
                player_id: Uuid::new_v4(),
            })
            .await
            .unwrap();

        let err = handler
            .handle(&JoinGuild {
                guild_id,
                player_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
