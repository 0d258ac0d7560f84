//! SQLite SnapshotStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::event::SnapshotRecord;
use crate::interfaces::SnapshotStore;
use crate::storage::schema::Snapshots;

/// SQLite implementation of [`SnapshotStore`].
///
/// The primary key on `(aggregate_id, aggregate_type)` means `save` is an
/// upsert: only the most recent snapshot per aggregate is retained.
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    /// Create a new SQLite snapshot store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the snapshots table if it does not exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(crate::storage::schema::CREATE_SNAPSHOTS_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn save(&self, snapshot: SnapshotRecord) -> Result<()> {
        let query = Query::insert()
            .into_table(Snapshots::Table)
            .columns([
                Snapshots::AggregateId,
                Snapshots::AggregateType,
                Snapshots::Version,
                Snapshots::StateData,
                Snapshots::CreatedAt,
            ])
            .values_panic([
                snapshot.aggregate_id.to_string().into(),
                snapshot.aggregate_type.clone().into(),
                (snapshot.version as i64).into(),
                serde_json::to_string(&snapshot.state)?.into(),
                snapshot.created_at.to_rfc3339().into(),
            ])
            .on_conflict(
                OnConflict::columns([Snapshots::AggregateId, Snapshots::AggregateType])
                    .update_columns([
                        Snapshots::Version,
                        Snapshots::StateData,
                        Snapshots::CreatedAt,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn get_latest(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
    ) -> Result<Option<SnapshotRecord>> {
        let query = Query::select()
            .columns([
                Snapshots::Version,
                Snapshots::StateData,
                Snapshots::CreatedAt,
            ])
            .from(Snapshots::Table)
            .and_where(Expr::col(Snapshots::AggregateId).eq(aggregate_id.to_string()))
            .and_where(Expr::col(Snapshots::AggregateType).eq(aggregate_type))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let version: i64 = row.get("version");
        let state: String = row.get("state_data");
        let created_at: String = row.get("created_at");

        Ok(Some(SnapshotRecord {
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            version: version as u64,
            state: serde_json::from_str(&state)?,
            created_at: parse_timestamp(&created_at)?,
        }))
    }

    async fn delete(&self, aggregate_id: Uuid, aggregate_type: &str) -> Result<()> {
        let query = Query::delete()
            .from_table(Snapshots::Table)
            .and_where(Expr::col(Snapshots::AggregateId).eq(aggregate_id.to_string()))
            .and_where(Expr::col(Snapshots::AggregateType).eq(aggregate_type))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CoreError::StoreUnavailable(format!("corrupt timestamp: {e}")))
}
