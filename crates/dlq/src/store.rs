use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::Result;
use crate::record::DeadLetterRecord;
use crate::sink::DeadLetterHandler;

/// A persisted dead-letter record as operators see it.
#[derive(Debug, Clone)]
pub struct ErrorLogEntry {
    pub error_id: Uuid,
    pub dlq_event_id: String,
    pub payment_id: Option<String>,
    pub saga_id: Option<String>,
    pub error_type: String,
    pub error_reason: String,
    pub original_event: serde_json::Value,
    pub failure_details: serde_json::Value,
    pub retry_history: serde_json::Value,
    pub first_occurred_at: DateTime<Utc>,
    pub last_occurred_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ErrorLogEntry {
    /// Builds an entry from a ring record, extracting the payment and saga
    /// ids from the original event's payload.
    pub fn from_record(record: &DeadLetterRecord) -> Result<Self> {
        let payload = &record.original_event.payload;
        let payment_id = payload.payment_id().map(|id| id.to_string());
        let saga_id = payload.saga_id().map(|id| id.to_string());
        let original_event = serde_json::to_value(record.original_event.to_envelope()?)?;

        Ok(Self {
            error_id: Uuid::new_v4(),
            dlq_event_id: record.dlq_event_id.clone(),
            payment_id,
            saga_id,
            error_type: record.error_type.as_str().to_string(),
            error_reason: record.failure_reason.clone(),
            original_event,
            failure_details: record.error_details.clone(),
            retry_history: serde_json::Value::Array(Vec::new()),
            first_occurred_at: record.first_failure_at,
            last_occurred_at: record.last_attempt_at,
            resolved: false,
            resolved_at: None,
            created_at: Utc::now(),
        })
    }
}

/// Authoritative persistence for dead-letter records.
#[async_trait]
pub trait ErrorLogStore: Send + Sync {
    /// Persists one record for operator review.
    async fn persist(&self, record: &DeadLetterRecord) -> Result<()>;

    /// Returns the newest unresolved entries, up to `limit`.
    async fn unresolved(&self, limit: i64) -> Result<Vec<ErrorLogEntry>>;

    /// Marks an entry resolved, stamping the resolution time.
    async fn mark_resolved(&self, error_id: Uuid) -> Result<()>;
}

/// `error_logs` table implementation.
#[derive(Clone)]
pub struct PostgresErrorLogStore {
    pool: PgPool,
}

impl PostgresErrorLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: PgRow) -> Result<ErrorLogEntry> {
        Ok(ErrorLogEntry {
            error_id: row.try_get("error_id")?,
            dlq_event_id: row.try_get("dlq_event_id")?,
            payment_id: row.try_get("payment_id")?,
            saga_id: row.try_get("saga_id")?,
            error_type: row.try_get("error_type")?,
            error_reason: row.try_get("error_reason")?,
            original_event: row.try_get("original_event")?,
            failure_details: row.try_get("failure_details")?,
            retry_history: row.try_get("retry_history")?,
            first_occurred_at: row.try_get("first_occurred_at")?,
            last_occurred_at: row.try_get("last_occurred_at")?,
            resolved: row.try_get("resolved")?,
            resolved_at: row.try_get("resolved_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl ErrorLogStore for PostgresErrorLogStore {
    async fn persist(&self, record: &DeadLetterRecord) -> Result<()> {
        let entry = ErrorLogEntry::from_record(record)?;

        sqlx::query(
            r#"
            INSERT INTO error_logs (
                error_id, dlq_event_id, payment_id, saga_id, error_type, error_reason,
                original_event, failure_details, retry_history,
                first_occurred_at, last_occurred_at, resolved, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(entry.error_id)
        .bind(&entry.dlq_event_id)
        .bind(&entry.payment_id)
        .bind(&entry.saga_id)
        .bind(&entry.error_type)
        .bind(&entry.error_reason)
        .bind(&entry.original_event)
        .bind(&entry.failure_details)
        .bind(&entry.retry_history)
        .bind(entry.first_occurred_at)
        .bind(entry.last_occurred_at)
        .bind(entry.resolved)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn unresolved(&self, limit: i64) -> Result<Vec<ErrorLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT error_id, dlq_event_id, payment_id, saga_id, error_type, error_reason,
                   original_event, failure_details, retry_history,
                   first_occurred_at, last_occurred_at, resolved, resolved_at, created_at
            FROM error_logs
            WHERE resolved = FALSE
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn mark_resolved(&self, error_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE error_logs SET resolved = TRUE, resolved_at = NOW() WHERE error_id = $1")
            .bind(error_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// In-memory error log for tests and brokerless local runs.
#[derive(Clone, Default)]
pub struct InMemoryErrorLogStore {
    entries: Arc<Mutex<Vec<ErrorLogEntry>>>,
}

impl InMemoryErrorLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ErrorLogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ErrorLogStore for InMemoryErrorLogStore {
    async fn persist(&self, record: &DeadLetterRecord) -> Result<()> {
        let entry = ErrorLogEntry::from_record(record)?;
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    async fn unresolved(&self, limit: i64) -> Result<Vec<ErrorLogEntry>> {
        let entries = self.entries.lock().unwrap();
        let mut unresolved: Vec<_> = entries.iter().filter(|e| !e.resolved).cloned().collect();
        unresolved.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        unresolved.truncate(limit as usize);
        Ok(unresolved)
    }

    async fn mark_resolved(&self, error_id: Uuid) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.iter_mut().find(|e| e.error_id == error_id) {
            entry.resolved = true;
            entry.resolved_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// Dead-letter subscriber that writes every record to the error log.
pub struct ErrorLogPersister<S: ErrorLogStore> {
    store: S,
}

impl<S: ErrorLogStore> ErrorLogPersister<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: ErrorLogStore> DeadLetterHandler for ErrorLogPersister<S> {
    async fn handle(
        &self,
        record: DeadLetterRecord,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.store.persist(&record).await?;
        tracing::info!(
            dlq_event_id = record.dlq_event_id,
            error_type = %record.error_type,
            "dead-letter record persisted to error log"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{EventMetadata, PaymentId, SagaId, UserId};
    use domain::{Event, Money};

    fn record() -> (PaymentId, SagaId, DeadLetterRecord) {
        let payment_id = PaymentId::new();
        let saga_id = SagaId::new();
        let event = Event::external_payment_failed(
            payment_id,
            saga_id,
            UserId::new("user_1"),
            Money::from_cents(2000),
            "USD",
            "MAX_RETRIES_EXCEEDED",
            "external",
            EventMetadata::new(),
        );
        let record = DeadLetterRecord::new(
            event,
            "MAX_RETRIES_EXCEEDED",
            "external-payment-service",
            "events.payments.v1",
            0,
            0,
        );
        (payment_id, saga_id, record)
    }

    #[tokio::test]
    async fn persist_extracts_payment_and_saga_ids() {
        let store = InMemoryErrorLogStore::new();
        let (payment_id, saga_id, record) = record();

        store.persist(&record).await.unwrap();

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payment_id.as_deref(), Some(payment_id.to_string().as_str()));
        assert_eq!(entries[0].saga_id.as_deref(), Some(saga_id.to_string().as_str()));
        assert_eq!(entries[0].error_type, "TIMEOUT_MAX_RETRIES");
        assert!(!entries[0].resolved);
    }

    #[tokio::test]
    async fn unresolved_hides_resolved_entries() {
        let store = InMemoryErrorLogStore::new();
        let (_, _, first) = record();
        let (_, _, second) = record();
        store.persist(&first).await.unwrap();
        store.persist(&second).await.unwrap();

        let unresolved = store.unresolved(10).await.unwrap();
        assert_eq!(unresolved.len(), 2);

        store.mark_resolved(unresolved[0].error_id).await.unwrap();
        let remaining = store.unresolved(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }
}
