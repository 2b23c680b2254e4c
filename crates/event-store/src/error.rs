use common::EventId;
use thiserror::Error;

/// Errors that can occur when interacting with the event log.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// An event with the same id has already been appended. Appends are
    /// the idempotency boundary of the system, so callers treat this as
    /// "already done" rather than as a failure.
    #[error("event {0} already exists in the log")]
    Conflict(EventId),

    /// The backing store is unreachable or rejected the operation.
    #[error("event store unavailable: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Payload or metadata could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event log operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
