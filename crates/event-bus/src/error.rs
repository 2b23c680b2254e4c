use thiserror::Error;

/// Errors that can occur when interacting with the event bus.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// The bus has been closed; no further publishes or subscriptions.
    #[error("event bus is closed")]
    Closed,

    /// The partition for an event could not be determined.
    #[error("cannot determine partition for {event_type}: {reason}")]
    Partition { event_type: String, reason: String },

    /// The topic has an unusable partition count.
    #[error("invalid number of partitions: {0}")]
    InvalidPartitionCount(usize),

    /// An event could not be serialized for the wire.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A payload failed closed-dispatch interpretation.
    #[error("event decoding error: {0}")]
    Decode(#[from] domain::DomainError),
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, EventBusError>;
