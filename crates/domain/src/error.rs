use thiserror::Error;

use crate::money::Money;
use crate::state::SagaState;

/// Errors produced by the domain model.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The saga state machine does not allow this transition. Terminal
    /// states allow none.
    #[error("invalid saga transition: {from} -> {to}")]
    InvalidTransition { from: SagaState, to: SagaState },

    /// The wallet does not hold enough available balance for the debit.
    /// This is a business outcome, not an infrastructure failure; handlers
    /// convert it into a `FundsInsufficient` event.
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Money, available: Money },

    /// An amount that must be strictly positive was zero or negative.
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Money),

    /// An event payload could not be (de)serialized.
    #[error("event serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
