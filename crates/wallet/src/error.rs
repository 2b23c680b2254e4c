use thiserror::Error;

/// Errors produced by the wallet service.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Domain validation failed (non-positive amount and friends).
    #[error(transparent)]
    Domain(#[from] domain::DomainError),

    /// The event log failed.
    #[error("event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// The event bus failed.
    #[error("event bus error: {0}")]
    EventBus(#[from] event_bus::EventBusError),
}

/// Result type for wallet operations.
pub type Result<T> = std::result::Result<T, WalletError>;
