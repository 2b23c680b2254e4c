use std::sync::Arc;

use async_trait::async_trait;
use domain::Event;

use crate::Result;

/// Error type returned by event handlers.
///
/// A handler error means "do not commit the offset": the message is
/// redelivered until the handler succeeds. Business outcomes (insufficient
/// funds, gateway rejection) are emitted as events and return `Ok`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A consumer of events delivered by the bus.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event) -> std::result::Result<(), HandlerError>;
}

/// Partitioned topic transport with consumer groups.
///
/// Every group sees every event; within a group each partition is processed
/// by exactly one member, sequentially, in publication order.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Enqueues an event on `topic` at the partition derived from the
    /// event's type and key. At-least-once: a successful return means the
    /// message is durable in the topic, not that anyone consumed it.
    async fn publish(&self, topic: &str, event: &Event) -> Result<()>;

    /// Registers `handler` as a member of `group_id` on `topic` and starts
    /// its delivery loops. Returns once the subscription is registered.
    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()>;
}
