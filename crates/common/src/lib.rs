//! Shared identifier and metadata types for the payment saga platform.

mod ids;
mod metadata;

pub use ids::{AggregateId, EventId, PaymentId, SagaId, UserId};
pub use metadata::EventMetadata;
