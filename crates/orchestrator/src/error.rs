use common::PaymentId;
use thiserror::Error;

/// Errors produced by the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The creation request was malformed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// No events exist for the payment id.
    #[error("payment not found: {0}")]
    NotFound(PaymentId),

    /// The payment stream exists but has no originating request event, so
    /// the saga identity cannot be recovered.
    #[error("no request event found for payment {0}")]
    MissingRequestEvent(PaymentId),

    /// The event log failed.
    #[error("event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// The event bus failed.
    #[error("event bus error: {0}")]
    EventBus(#[from] event_bus::EventBusError),

    /// A payload conversion failed.
    #[error(transparent)]
    Domain(#[from] domain::DomainError),
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
