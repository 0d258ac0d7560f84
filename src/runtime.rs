//! Wires storage, repository, buses, projections and sagas into one
//! running core.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::aggregate::AggregateRegistry;
use crate::bus::{CommandBus, EventBus};
use crate::config::Config;
use crate::error::Result;
use crate::handlers::{GuildCommandHandler, PlayerCommandHandler};
use crate::interfaces::{EventStore, SnapshotStore};
use crate::projection::{GuildDirectory, PlayerRoster, ProjectionManager};
use crate::repository::AggregateRepository;
use crate::saga::SagaCoordinator;
use crate::storage::init_storage;

/// The assembled core: every component started and wired together.
pub struct CoreRuntime {
    event_store: Arc<dyn EventStore>,
    snapshot_store: Arc<dyn SnapshotStore>,
    repository: Arc<AggregateRepository>,
    command_bus: Arc<CommandBus>,
    event_bus: Arc<EventBus>,
    projection_manager: Arc<ProjectionManager>,
    player_roster: Arc<PlayerRoster>,
    guild_directory: Arc<GuildDirectory>,
    saga_coordinator: Arc<SagaCoordinator>,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl CoreRuntime {
    /// Build and start the core from configuration.
    pub async fn start(config: Config) -> Result<Self> {
        let (event_store, snapshot_store) = init_storage(&config).await?;

        let registry = Arc::new(AggregateRegistry::game_platform());
        let repository = Arc::new(AggregateRepository::new(
            Arc::clone(&event_store),
            Arc::clone(&snapshot_store),
            registry,
            config.repository_config(),
        ));

        let command_bus = Arc::new(CommandBus::new());
        let event_bus = Arc::new(EventBus::new());

        let projection_manager = Arc::new(ProjectionManager::new(
            Arc::clone(&event_bus),
            Arc::clone(&event_store),
        ));
        let player_roster = Arc::new(PlayerRoster::new());
        let guild_directory = Arc::new(GuildDirectory::new());
        projection_manager
            .register_projection(player_roster.clone())
            .await;
        projection_manager
            .register_projection(guild_directory.clone())
            .await;

        let saga_coordinator = Arc::new(SagaCoordinator::new(config.saga_config()));

        Arc::new(PlayerCommandHandler::new(
            Arc::clone(&repository),
            Arc::clone(&event_bus),
        ))
        .register(&command_bus)
        .await?;
        Arc::new(GuildCommandHandler::new(
            Arc::clone(&repository),
            Arc::clone(&event_bus),
        ))
        .register(&command_bus)
        .await?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let workers = vec![
            repository.spawn_cache_sweeper(shutdown_rx.clone()),
            saga_coordinator.spawn_stale_sweeper(shutdown_rx),
        ];

        info!("core runtime started");
        Ok(Self {
            event_store,
            snapshot_store,
            repository,
            command_bus,
            event_bus,
            projection_manager,
            player_roster,
            guild_directory,
            saga_coordinator,
            shutdown,
            workers,
        })
    }

    /// Signal the background workers and wait for them to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            let _ = worker.await;
        }
        info!("core runtime stopped");
    }

    pub fn event_store(&self) -> &Arc<dyn EventStore> {
        &self.event_store
    }

    pub fn snapshot_store(&self) -> &Arc<dyn SnapshotStore> {
        &self.snapshot_store
    }

    pub fn repository(&self) -> &Arc<AggregateRepository> {
        &self.repository
    }

    pub fn command_bus(&self) -> &Arc<CommandBus> {
        &self.command_bus
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn projection_manager(&self) -> &Arc<ProjectionManager> {
        &self.projection_manager
    }

    pub fn player_roster(&self) -> &Arc<PlayerRoster> {
        &self.player_roster
    }

    pub fn guild_directory(&self) -> &Arc<GuildDirectory> {
        &self.guild_directory
    }

    pub fn saga_coordinator(&self) -> &Arc<SagaCoordinator> {
        &self.saga_coordinator
    }
}
