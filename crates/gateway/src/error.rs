use thiserror::Error;

/// Errors produced by the external payment service.
#[derive(Debug, Error)]
pub enum ExternalPaymentError {
    /// The event log failed.
    #[error("event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// The event bus failed.
    #[error("event bus error: {0}")]
    EventBus(#[from] event_bus::EventBusError),

    /// A payload conversion failed.
    #[error(transparent)]
    Domain(#[from] domain::DomainError),

    /// The dead-letter sink failed.
    #[error("dead-letter error: {0}")]
    DeadLetter(#[from] dlq::DlqError),
}

/// Result type for external payment operations.
pub type Result<T> = std::result::Result<T, ExternalPaymentError>;
