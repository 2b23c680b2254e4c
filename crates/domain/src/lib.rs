//! Domain model: the closed event set and the two event-sourced aggregates.
//!
//! Events are the only facts in the system. Both aggregates ([`Wallet`] and
//! [`Saga`]) are ephemeral rebuilds: whoever needs current state loads the
//! aggregate's event stream and folds it, so no state is ever shared between
//! handlers.

pub mod error;
pub mod event;
pub mod money;
pub mod saga;
pub mod state;
pub mod wallet;

pub use error::DomainError;
pub use event::{
    AggregateType, Event, EventPayload, ExternalPaymentCompletedData, ExternalPaymentFailedData,
    ExternalPaymentRequestedData, FundsCreditedData, FundsDebitedData, FundsInsufficientData,
    GATEWAY_STATUS_SUCCESS, PaymentGatewayResponseData, PaymentGatewayTimeoutData,
    PaymentRetryRequestedData, PaymentSentToGatewayData, WalletPaymentCompletedData,
    WalletPaymentFailedData, WalletPaymentRequestedData,
};
pub use money::Money;
pub use saga::{PaymentKind, Saga};
pub use state::SagaState;
pub use wallet::Wallet;
