//! SQLite EventStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::event::{DomainEvent, EventMetadata};
use crate::interfaces::EventStore;
use crate::storage::schema::Events;

/// SQLite implementation of [`EventStore`].
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Create a new SQLite event store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the events table and indexes if they do not exist.
    pub async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        for statement in crate::storage::schema::CREATE_EVENTS_TABLE
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            sqlx::query(statement).execute(&mut *conn).await?;
        }
        Ok(())
    }

    /// Read the stream's current version within an open connection.
    async fn stored_version(
        conn: &mut SqliteConnection,
        aggregate_id: &str,
        aggregate_type: &str,
    ) -> Result<u64> {
        let query = Query::select()
            .expr(Expr::col(Events::Version).max())
            .from(Events::Table)
            .and_where(Expr::col(Events::AggregateId).eq(aggregate_id))
            .and_where(Expr::col(Events::AggregateType).eq(aggregate_type))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;

        Ok(row
            .and_then(|row| row.get::<Option<i64>, _>(0))
            .map(|v| v as u64)
            .unwrap_or(0))
    }

    async fn insert_events(
        conn: &mut SqliteConnection,
        aggregate_id: Uuid,
        aggregate_type: &str,
        events: Vec<DomainEvent>,
        expected_version: u64,
    ) -> Result<()> {
        let id_str = aggregate_id.to_string();
        let actual = Self::stored_version(conn, &id_str, aggregate_type).await?;
        if actual != expected_version {
            return Err(CoreError::ConcurrencyConflict {
                aggregate_id,
                aggregate_type: aggregate_type.to_string(),
                expected: expected_version,
                actual,
            });
        }

        for (offset, mut event) in events.into_iter().enumerate() {
            event.version = expected_version + offset as u64 + 1;

            let metadata = match &event.metadata {
                Some(m) => Some(serde_json::to_string(m)?),
                None => None,
            };
            let correlation_id = event.correlation_id().map(|c| c.to_string());

            let query = Query::insert()
                .into_table(Events::Table)
                .columns([
                    Events::EventId,
                    Events::AggregateId,
                    Events::AggregateType,
                    Events::EventType,
                    Events::Version,
                    Events::Payload,
                    Events::Metadata,
                    Events::CorrelationId,
                    Events::EventTimestamp,
                ])
                .values_panic([
                    event.event_id.to_string().into(),
                    id_str.clone().into(),
                    aggregate_type.into(),
                    event.event_type.clone().into(),
                    (event.version as i64).into(),
                    serde_json::to_string(&event.payload)?.into(),
                    metadata.into(),
                    correlation_id.into(),
                    event.timestamp.to_rfc3339().into(),
                ])
                .to_string(SqliteQueryBuilder);

            sqlx::query(&query)
                .execute(&mut *conn)
                .await
                .map_err(|e| translate_unique_violation(e, aggregate_id, aggregate_type, expected_version))?;
        }

        Ok(())
    }

    async fn fetch_events(&self, query: String) -> Result<Vec<DomainEvent>> {
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            events.push(row_to_event(&row)?);
        }
        Ok(events)
    }
}

/// A unique-constraint failure on insert means a racing writer committed
/// the same version first; surface it as a concurrency conflict so the
/// caller can reload and retry. `actual` is provisional here; `append`
/// replaces it with the stream's committed version after rollback.
fn translate_unique_violation(
    e: sqlx::Error,
    aggregate_id: Uuid,
    aggregate_type: &str,
    expected: u64,
) -> CoreError {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() {
            return CoreError::ConcurrencyConflict {
                aggregate_id,
                aggregate_type: aggregate_type.to_string(),
                expected,
                actual: expected,
            };
        }
    }
    e.into()
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<DomainEvent> {
    let event_id: String = row.get("event_id");
    let aggregate_id: String = row.get("aggregate_id");
    let aggregate_type: String = row.get("aggregate_type");
    let event_type: String = row.get("event_type");
    let version: i64 = row.get("version");
    let payload: String = row.get("payload");
    let metadata: Option<String> = row.get("metadata");
    let timestamp: String = row.get("event_timestamp");

    let metadata = match metadata {
        Some(m) => Some(serde_json::from_str::<EventMetadata>(&m)?),
        None => None,
    };

    Ok(DomainEvent {
        event_id: parse_uuid(&event_id)?,
        aggregate_id: parse_uuid(&aggregate_id)?,
        aggregate_type,
        event_type,
        version: version as u64,
        timestamp: parse_timestamp(&timestamp)?,
        payload: serde_json::from_str(&payload)?,
        metadata,
    })
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| CoreError::StoreUnavailable(format!("corrupt uuid: {e}")))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CoreError::StoreUnavailable(format!("corrupt timestamp: {e}")))
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        events: Vec<DomainEvent>,
        expected_version: u64,
    ) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        // BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
        // when concurrent DEFERRED transactions race to upgrade from shared to exclusive.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = Self::insert_events(
            &mut conn,
            aggregate_id,
            aggregate_type,
            events,
            expected_version,
        )
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(())
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                // report the committed version, not a guess; a multi-event
                // racing writer may have moved the stream past expected + 1
                Err(match e {
                    CoreError::ConcurrencyConflict {
                        aggregate_id,
                        aggregate_type,
                        expected,
                        actual,
                    } => {
                        let actual = Self::stored_version(
                            &mut conn,
                            &aggregate_id.to_string(),
                            &aggregate_type,
                        )
                        .await
                        .unwrap_or(actual);
                        CoreError::ConcurrencyConflict {
                            aggregate_id,
                            aggregate_type,
                            expected,
                            actual,
                        }
                    }
                    other => other,
                })
            }
        }
    }

    async fn read(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        from_version: u64,
    ) -> Result<Vec<DomainEvent>> {
        let query = Query::select()
            .columns([
                Events::EventId,
                Events::AggregateId,
                Events::AggregateType,
                Events::EventType,
                Events::Version,
                Events::Payload,
                Events::Metadata,
                Events::EventTimestamp,
            ])
            .from(Events::Table)
            .and_where(Expr::col(Events::AggregateId).eq(aggregate_id.to_string()))
            .and_where(Expr::col(Events::AggregateType).eq(aggregate_type))
            .and_where(Expr::col(Events::Version).gte(from_version as i64))
            .order_by(Events::Version, Order::Asc)
            .to_string(SqliteQueryBuilder);

        self.fetch_events(query).await
    }

    async fn current_version(&self, aggregate_id: Uuid, aggregate_type: &str) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        Self::stored_version(&mut conn, &aggregate_id.to_string(), aggregate_type).await
    }

    async fn list_streams(&self) -> Result<Vec<(Uuid, String)>> {
        let query = Query::select()
            .distinct()
            .columns([Events::AggregateId, Events::AggregateType])
            .from(Events::Table)
            .order_by(Events::AggregateType, Order::Asc)
            .order_by(Events::AggregateId, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut streams = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("aggregate_id");
            let aggregate_type: String = row.get("aggregate_type");
            streams.push((parse_uuid(&id)?, aggregate_type));
        }
        Ok(streams)
    }

    async fn read_by_correlation(&self, correlation_id: Uuid) -> Result<Vec<DomainEvent>> {
        let query = Query::select()
            .columns([
                Events::EventId,
                Events::AggregateId,
                Events::AggregateType,
                Events::EventType,
                Events::Version,
                Events::Payload,
                Events::Metadata,
                Events::EventTimestamp,
            ])
            .from(Events::Table)
            .and_where(Expr::col(Events::CorrelationId).eq(correlation_id.to_string()))
            .order_by(Events::EventTimestamp, Order::Asc)
            .order_by(Events::Version, Order::Asc)
            .to_string(SqliteQueryBuilder);

        self.fetch_events(query).await
    }
}
