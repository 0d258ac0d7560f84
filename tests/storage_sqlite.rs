//! SQLite store contract tests.

use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use chronicle::error::CoreError;
use chronicle::event::{DomainEvent, EventMetadata, SnapshotRecord};
use chronicle::interfaces::{EventStore, SnapshotStore};
use chronicle::storage::{SqliteEventStore, SqliteSnapshotStore};

// :memory: gives each connection its own database, so the pool must
// stay at a single connection
async fn pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

async fn event_store() -> SqliteEventStore {
    let store = SqliteEventStore::new(pool().await);
    store.init().await.unwrap();
    store
}

fn make_event(aggregate_id: Uuid, event_type: &str) -> DomainEvent {
    DomainEvent::new(aggregate_id, "player", event_type, 0, json!({"kind": "created", "username": "neo"}))
}

#[tokio::test]
async fn test_append_assigns_versions_and_read_is_ordered() {
    let store = event_store().await;
    let id = Uuid::new_v4();

    store
        .append(
            id,
            "player",
            vec![
                make_event(id, "player.created"),
                make_event(id, "player.level_gained"),
            ],
            0,
        )
        .await
        .unwrap();
    store
        .append(id, "player", vec![make_event(id, "player.renamed")], 2)
        .await
        .unwrap();

    let events = store.read(id, "player", 1).await.unwrap();
    let versions: Vec<u64> = events.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert_eq!(store.current_version(id, "player").await.unwrap(), 3);

    // inclusive lower bound
    let tail = store.read(id, "player", 3).await.unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].event_type, "player.renamed");
}

#[tokio::test]
async fn test_stale_expected_version_rejected_atomically() {
    let store = event_store().await;
    let id = Uuid::new_v4();

    store
        .append(id, "player", vec![make_event(id, "player.created")], 0)
        .await
        .unwrap();

    let err = store
        .append(
            id,
            "player",
            vec![
                make_event(id, "player.renamed"),
                make_event(id, "player.banned"),
            ],
            0,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ConcurrencyConflict { .. }));

    // the losing batch left nothing behind
    assert_eq!(store.current_version(id, "player").await.unwrap(), 1);
    assert_eq!(store.read(id, "player", 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_conflict_reports_the_committed_stream_version() {
    let store = event_store().await;
    let id = Uuid::new_v4();

    store
        .append(
            id,
            "player",
            vec![
                make_event(id, "player.created"),
                make_event(id, "player.level_gained"),
                make_event(id, "player.level_gained"),
            ],
            0,
        )
        .await
        .unwrap();

    // the stream moved three ahead of this writer's view
    let err = store
        .append(id, "player", vec![make_event(id, "player.renamed")], 1)
        .await
        .unwrap_err();
    match err {
        CoreError::ConcurrencyConflict {
            expected, actual, ..
        } => {
            assert_eq!(expected, 1);
            assert_eq!(actual, 3);
        }
        other => panic!("expected ConcurrencyConflict, got {other}"),
    }
}

#[tokio::test]
async fn test_missing_stream_reads_empty() {
    let store = event_store().await;
    let events = store.read(Uuid::new_v4(), "player", 1).await.unwrap();
    assert!(events.is_empty());
    assert_eq!(
        store
            .current_version(Uuid::new_v4(), "player")
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_round_trip_preserves_payload_and_metadata() {
    let store = event_store().await;
    let id = Uuid::new_v4();
    let correlation = Uuid::new_v4();

    let event = make_event(id, "player.created").with_metadata(EventMetadata {
        correlation_id: Some(correlation),
        causation_id: Some(Uuid::new_v4()),
    });
    store.append(id, "player", vec![event.clone()], 0).await.unwrap();

    let loaded = store.read(id, "player", 1).await.unwrap();
    assert_eq!(loaded[0].event_id, event.event_id);
    assert_eq!(loaded[0].payload, event.payload);
    assert_eq!(loaded[0].metadata, event.metadata);

    let correlated = store.read_by_correlation(correlation).await.unwrap();
    assert_eq!(correlated.len(), 1);
    assert_eq!(correlated[0].event_id, event.event_id);
}

#[tokio::test]
async fn test_list_streams_spans_types() {
    let store = event_store().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    store
        .append(a, "player", vec![make_event(a, "player.created")], 0)
        .await
        .unwrap();
    store
        .append(b, "guild", vec![make_event(b, "guild.founded")], 0)
        .await
        .unwrap();

    let streams = store.list_streams().await.unwrap();
    assert_eq!(streams.len(), 2);
    assert!(streams.contains(&(a, "player".to_string())));
    assert!(streams.contains(&(b, "guild".to_string())));
}

#[tokio::test]
async fn test_snapshot_upsert_keeps_latest_only() {
    let store = SqliteSnapshotStore::new(pool().await);
    store.init().await.unwrap();
    let id = Uuid::new_v4();

    store
        .save(SnapshotRecord::new(id, "player", 50, json!({"level": 50})))
        .await
        .unwrap();
    store
        .save(SnapshotRecord::new(id, "player", 100, json!({"level": 100})))
        .await
        .unwrap();

    let latest = store.get_latest(id, "player").await.unwrap().unwrap();
    assert_eq!(latest.version, 100);
    assert_eq!(latest.state["level"], 100);

    store.delete(id, "player").await.unwrap();
    assert!(store.get_latest(id, "player").await.unwrap().is_none());
}
