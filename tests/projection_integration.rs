//! Projection delivery and rebuild through the full runtime.

use std::sync::Arc;

use uuid::Uuid;

use chronicle::config::Config;
use chronicle::handlers::{CreatePlayer, DisbandGuild, FoundGuild, GainLevel, JoinGuild};
use chronicle::runtime::CoreRuntime;

fn memory_config() -> Config {
    let mut config = Config::default();
    config.storage.storage_type = "memory".to_string();
    config
}

#[tokio::test]
async fn test_commands_update_read_models_live() {
    let runtime = CoreRuntime::start(memory_config()).await.unwrap();
    let player_id = Uuid::new_v4();
    let guild_id = Uuid::new_v4();

    runtime
        .command_bus()
        .send(&CreatePlayer {
            player_id,
            username: "neo".to_string(),
        })
        .await
        .unwrap();
    runtime
        .command_bus()
        .send(&GainLevel {
            player_id,
            new_level: 12,
        })
        .await
        .unwrap();
    runtime
        .command_bus()
        .send(&FoundGuild {
            guild_id,
            name: "zion".to_string(),
            max_members: 5,
        })
        .await
        .unwrap();
    runtime
        .command_bus()
        .send(&JoinGuild {
            guild_id,
            player_id,
        })
        .await
        .unwrap();

    let entry = runtime.player_roster().get(player_id).await.unwrap();
    assert_eq!(entry.username, "neo");
    assert_eq!(entry.level, 12);

    let guild = runtime.guild_directory().get(guild_id).await.unwrap();
    assert_eq!(guild.name, "zion");
    assert_eq!(guild.member_count, 1);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_rebuild_recovers_read_models_from_history() {
    let runtime = CoreRuntime::start(memory_config()).await.unwrap();
    let player_id = Uuid::new_v4();
    let guild_id = Uuid::new_v4();

    runtime
        .command_bus()
        .send(&CreatePlayer {
            player_id,
            username: "neo".to_string(),
        })
        .await
        .unwrap();
    runtime
        .command_bus()
        .send(&FoundGuild {
            guild_id,
            name: "zion".to_string(),
            max_members: 5,
        })
        .await
        .unwrap();
    runtime
        .command_bus()
        .send(&DisbandGuild {
            guild_id,
            reason: "merger".to_string(),
        })
        .await
        .unwrap();

    // wipe and replay everything from the event store
    runtime.projection_manager().rebuild().await.unwrap();

    let entry = runtime.player_roster().get(player_id).await.unwrap();
    assert_eq!(entry.username, "neo");
    let guild = runtime.guild_directory().get(guild_id).await.unwrap();
    assert!(guild.disbanded);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_double_rebuild_is_idempotent() {
    let runtime = CoreRuntime::start(memory_config()).await.unwrap();
    let guild_id = Uuid::new_v4();

    runtime
        .command_bus()
        .send(&FoundGuild {
            guild_id,
            name: "zion".to_string(),
            max_members: 5,
        })
        .await
        .unwrap();
    for _ in 0..3 {
        runtime
            .command_bus()
            .send(&JoinGuild {
                guild_id,
                player_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
    }

    runtime.projection_manager().rebuild().await.unwrap();
    runtime.projection_manager().rebuild().await.unwrap();

    // member joins must not be double counted
    let guild = runtime.guild_directory().get(guild_id).await.unwrap();
    assert_eq!(guild.member_count, 3);

    let manager = Arc::clone(runtime.projection_manager());
    manager.reset_all().await;
    assert!(runtime.guild_directory().get(guild_id).await.is_none());

    runtime.shutdown().await;
}
