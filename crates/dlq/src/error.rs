use thiserror::Error;

/// Errors that can occur in the dead-letter path.
#[derive(Debug, Error)]
pub enum DlqError {
    /// The sink has been closed.
    #[error("dead-letter queue is closed")]
    Closed,

    /// The error-log table is unreachable.
    #[error("error log unavailable: {0}")]
    Database(#[from] sqlx::Error),

    /// A record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The original event could not be converted for storage.
    #[error("event encoding error: {0}")]
    Encode(#[from] domain::DomainError),
}

/// Result type for dead-letter operations.
pub type Result<T> = std::result::Result<T, DlqError>;
