//! External payment participant: drives the opaque payment gateway with a
//! bounded retry loop and escalates exhausted payments to the dead-letter
//! sink.

pub mod error;
pub mod gateway;
pub mod retry;
pub mod service;

pub use error::{ExternalPaymentError, Result};
pub use gateway::{
    GatewayError, GatewayRequest, GatewayResponse, MockOutcome, MockPaymentGateway, PaymentGateway,
};
pub use retry::RetryPolicy;
pub use service::ExternalPaymentService;
