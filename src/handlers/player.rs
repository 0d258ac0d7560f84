//! Player commands and their handler.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use backon::Retryable;
use tracing::warn;
use uuid::Uuid;

use crate::aggregate::Player;
use crate::bus::{Command, CommandBus, CommandHandler, EventBus};
use crate::error::{CoreError, Result};
use crate::repository::AggregateRepository;
use crate::retry::conflict_backoff;

pub struct CreatePlayer {
    pub player_id: Uuid,
    pub username: String,
}

pub struct GainLevel {
    pub player_id: Uuid,
    pub new_level: u32,
}

pub struct RenamePlayer {
    pub player_id: Uuid,
    pub username: String,
}

pub struct BanPlayer {
    pub player_id: Uuid,
    pub reason: String,
}

macro_rules! player_command {
    ($ty:ty, $command_type:literal) => {
        impl Command for $ty {
            fn command_type(&self) -> &'static str {
                $command_type
            }

            fn aggregate_id(&self) -> Uuid {
                self.player_id
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

player_command!(CreatePlayer, "player.create");
player_command!(GainLevel, "player.gain_level");
player_command!(RenamePlayer, "player.rename");
player_command!(BanPlayer, "player.ban");

/// Handles all player commands.
pub struct PlayerCommandHandler {
    repository: Arc<AggregateRepository>,
    event_bus: Arc<EventBus>,
}

impl PlayerCommandHandler {
    pub fn new(repository: Arc<AggregateRepository>, event_bus: Arc<EventBus>) -> Self {
        Self {
            repository,
            event_bus,
        }
    }

    /// Register this handler for every player command type.
    pub async fn register(self: Arc<Self>, bus: &CommandBus) -> Result<()> {
        for command_type in ["player.create", "player.gain_level", "player.rename", "player.ban"] {
            bus.register_handler(command_type, self.clone()).await?;
        }
        Ok(())
    }

    async fn execute(&self, command: &dyn Command) -> Result<()> {
        let mut aggregate = self
            .repository
            .load(Player::TYPE, command.aggregate_id())
            .await?;
        let player = aggregate
            .as_any_mut()
            .downcast_mut::<Player>()
            .ok_or_else(|| CoreError::UnknownAggregateType(Player::TYPE.to_string()))?;

        match command.command_type() {
            "player.create" => {
                let cmd = downcast::<CreatePlayer>(command)?;
                player.create(&cmd.username)?;
            }
            "player.gain_level" => {
                let cmd = downcast::<GainLevel>(command)?;
                player.gain_level(cmd.new_level)?;
            }
            "player.rename" => {
                let cmd = downcast::<RenamePlayer>(command)?;
                player.rename(&cmd.username)?;
            }
            "player.ban" => {
                let cmd = downcast::<BanPlayer>(command)?;
                player.ban(&cmd.reason)?;
            }
            other => return Err(CoreError::HandlerNotFound(other.to_string())),
        }

        let events = self.repository.save(aggregate.as_mut()).await?;
        for event in &events {
            // events are durable at this point; a failed fan-out is
            // recovered by a projection rebuild, not by failing the command
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
impl CommandHandler for PlayerCommandHandler {
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

    fn make_handler() -> (Arc<PlayerCommandHandler>, Arc<AggregateRepository>) {
        let repository = Arc::new(AggregateRepository::new(
            Arc::new(MemoryEventStore::new()),
            Arc::new(MemorySnapshotStore::new()),
            Arc::new(AggregateRegistry::game_platform()),
            RepositoryConfig::default(),
        ));
        let handler = Arc::new(PlayerCommandHandler::new(
            Arc::clone(&repository),
            Arc::new(EventBus::new()),
        ));
        (handler, repository)
    }

    #[tokio::test]
    async fn test_create_then_gain_level_persists() {
        let (handler, repository) = make_handler();
        let player_id = Uuid::new_v4();

        handler
            .handle(&CreatePlayer {
                player_id,
                username: "neo".to_string(),
            })
            .await
            .unwrap();
        handler
            .handle(&GainLevel {
                player_id,
                new_level: 3,
            })
            .await
            .unwrap();

        let loaded = repository.load("player", player_id).await.unwrap();
        let player = loaded.as_any().downcast_ref::<Player>().unwrap();
        assert_eq!(player.state().level, 3);
        assert_eq!(loaded.version(), 2);
    }

    #[tokio::test]
    async fn test_validation_error_is_not_retried() {
        let (handler, _) = make_handler();
        let player_id = Uuid::new_v4();

        let err = handler
            .handle(&GainLevel {
                player_id,
                new_level: 2,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_handler_registers_all_player_commands() {
        let (handler, _) = make_handler();
        let bus = CommandBus::new();
        handler.clone().register(&bus).await.unwrap();

        bus.send(&CreatePlayer {
            player_id: Uuid::new_v4(),
            username: "neo".to_string(),
        })
        .await
        .unwrap();
    }
}
