use async_trait::async_trait;
use common::AggregateId;

use crate::{EventEnvelope, Result};

/// Core trait for event log implementations.
///
/// All implementations must be thread-safe (`Send + Sync`); handlers on
/// different partitions append and load concurrently.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends one event and atomically assigns it the next monotonic
    /// sequence number, which is returned.
    ///
    /// Fails with [`EventStoreError::Conflict`] if an event with the same
    /// id already exists.
    ///
    /// [`EventStoreError::Conflict`]: crate::EventStoreError::Conflict
    async fn append(&self, event: EventEnvelope) -> Result<i64>;

    /// Returns all events for the aggregate in ascending sequence order.
    ///
    /// An aggregate with no events yields an empty vec. Reads observe the
    /// effect of every append that completed before the read began.
    async fn load(&self, aggregate_id: &AggregateId) -> Result<Vec<EventEnvelope>>;
}
