//! Partitioned pub/sub transport with consumer groups.
//!
//! Delivery is at-least-once: an offset is committed only after the handler
//! returns without error, so redelivery follows any failure and every
//! handler must be idempotent. Ordering is guaranteed per partition, and the
//! partitioner pins each aggregate key to one partition, which yields
//! per-payment and per-user ordering across the system.

pub mod bus;
pub mod error;
pub mod memory;
pub mod partition;

pub use bus::{EventBus, EventHandler, HandlerError};
pub use error::{EventBusError, Result};
pub use memory::InMemoryEventBus;
pub use partition::partition_for;

/// Topic carrying all payment and wallet events.
pub const TOPIC_PAYMENTS: &str = "events.payments.v1";

/// Reserved dead-letter topic; dead letters currently live in the
/// error-log table instead.
pub const TOPIC_DLQ: &str = "events.dlq.v1";

/// Consumer group of the saga orchestrator.
pub const GROUP_ORCHESTRATOR: &str = "saga-orchestrator";

/// Consumer group of the wallet service.
pub const GROUP_WALLET: &str = "wallet-service";

/// Consumer group of the external payment service.
pub const GROUP_EXTERNAL_PAYMENT: &str = "external-payment-service";

/// Consumer group reserved for metrics consumers.
pub const GROUP_METRICS: &str = "metrics-service";

/// Default number of partitions per topic.
pub const DEFAULT_NUM_PARTITIONS: usize = 12;
