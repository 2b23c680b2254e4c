use async_trait::async_trait;
use common::{AggregateId, EventId, EventMetadata};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{EventEnvelope, EventStoreError, Result, store::EventStore};

/// PostgreSQL-backed event log.
///
/// The `sequence_number` column is a `BIGSERIAL`, so ordering is assigned by
/// the database at insert; the primary key on `event_id` makes duplicate
/// appends fail with a unique violation that is surfaced as `Conflict`.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event log over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("event_metadata")?;
        let metadata: EventMetadata = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::new(row.try_get::<String, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: row.try_get("event_version")?,
            payload: row.try_get("event_data")?,
            metadata,
            timestamp: row.try_get("timestamp")?,
            sequence_number: row.try_get("sequence_number")?,
        })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(&self, event: EventEnvelope) -> Result<i64> {
        let metadata_json = serde_json::to_value(&event.metadata)?;

        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO events (
                event_id, aggregate_id, aggregate_type, event_type,
                event_version, event_data, event_metadata, timestamp
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING sequence_number
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(event.aggregate_id.as_str())
        .bind(&event.aggregate_type)
        .bind(&event.event_type)
        .bind(event.version)
        .bind(&event.payload)
        .bind(metadata_json)
        .bind(event.timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("events_pkey")
            {
                return EventStoreError::Conflict(event.event_id);
            }
            EventStoreError::Database(e)
        })?;

        Ok(sequence)
    }

    async fn load(&self, aggregate_id: &AggregateId) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, aggregate_id, aggregate_type, event_type,
                   event_version, event_data, event_metadata, timestamp, sequence_number
            FROM events
            WHERE aggregate_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }
}
