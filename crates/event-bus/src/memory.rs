use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use domain::Event;
use event_store::EventEnvelope;

use crate::bus::{EventBus, EventHandler};
use crate::error::{EventBusError, Result};
use crate::partition::partition_for;

/// How long a delivery loop waits when its partition has no new messages.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Backoff before redelivering a message whose handler failed.
const REDELIVERY_DELAY: Duration = Duration::from_millis(50);

/// One serialized message on a partition. The message key equals the
/// aggregate id and is implicit in the partition assignment.
#[derive(Clone)]
struct Message {
    value: Vec<u8>,
}

struct GroupState {
    members: RwLock<Vec<Arc<dyn EventHandler>>>,
    /// Committed offset per partition. Advanced only after a successful
    /// handle (or when dropping a poison message).
    offsets: Vec<Mutex<usize>>,
}

struct TopicState {
    partitions: Vec<RwLock<Vec<Message>>>,
    groups: RwLock<HashMap<String, Arc<GroupState>>>,
}

impl TopicState {
    fn new(num_partitions: usize) -> Self {
        Self {
            partitions: (0..num_partitions).map(|_| RwLock::new(Vec::new())).collect(),
            groups: RwLock::new(HashMap::new()),
        }
    }
}

struct BusInner {
    num_partitions: usize,
    topics: RwLock<HashMap<String, Arc<TopicState>>>,
    running: AtomicBool,
}

/// In-process implementation of the broker seam.
///
/// Faithful to the contract the real broker provides: partitioned topics,
/// fan-out per consumer group, one member per partition within a group,
/// per-partition ordering, and at-least-once delivery with offsets committed
/// only after the handler succeeds. Used by tests and brokerless local runs.
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<BusInner>,
}

impl InMemoryEventBus {
    /// Creates a bus whose topics have `num_partitions` partitions.
    pub fn new(num_partitions: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                num_partitions,
                topics: RwLock::new(HashMap::new()),
                running: AtomicBool::new(true),
            }),
        }
    }

    /// Stops all delivery loops and rejects further publishes. Loops exit
    /// after their current handler invocation returns.
    pub fn close(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }

    fn topic(&self, name: &str) -> Arc<TopicState> {
        if let Some(topic) = self.inner.topics.read().unwrap().get(name) {
            return topic.clone();
        }
        let mut topics = self.inner.topics.write().unwrap();
        topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TopicState::new(self.inner.num_partitions)))
            .clone()
    }

    #[cfg(test)]
    fn push_raw(&self, topic: &str, partition: usize, value: Vec<u8>) {
        let topic = self.topic(topic);
        topic.partitions[partition]
            .write()
            .unwrap()
            .push(Message { value });
    }

    fn spawn_partition_loop(
        inner: Arc<BusInner>,
        topic: Arc<TopicState>,
        group: Arc<GroupState>,
        partition: usize,
    ) {
        tokio::spawn(async move {
            loop {
                if !inner.running.load(Ordering::SeqCst) {
                    return;
                }

                let offset = *group.offsets[partition].lock().unwrap();
                let message = {
                    let messages = topic.partitions[partition].read().unwrap();
                    messages.get(offset).cloned()
                };

                let Some(message) = message else {
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                };

                let handler = {
                    let members = group.members.read().unwrap();
                    members[partition % members.len()].clone()
                };

                let decoded = serde_json::from_slice::<EventEnvelope>(&message.value)
                    .map_err(EventBusError::from)
                    .and_then(|envelope| Event::from_envelope(envelope).map_err(EventBusError::from));

                let event = match decoded {
                    Ok(event) => event,
                    Err(err) => {
                        // Poison message: commit past it rather than
                        // blocking the partition head.
                        tracing::warn!(partition, offset, %err, "dropping undecodable message");
                        metrics::counter!("event_bus_poison_messages_total").increment(1);
                        *group.offsets[partition].lock().unwrap() = offset + 1;
                        continue;
                    }
                };

                match handler.handle(event).await {
                    Ok(()) => {
                        *group.offsets[partition].lock().unwrap() = offset + 1;
                    }
                    Err(err) => {
                        tracing::warn!(
                            partition,
                            offset,
                            %err,
                            "handler failed, message will be redelivered"
                        );
                        metrics::counter!("event_bus_handler_failures_total").increment(1);
                        tokio::time::sleep(REDELIVERY_DELAY).await;
                    }
                }
            }
        });
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic_name: &str, event: &Event) -> Result<()> {
        if !self.inner.running.load(Ordering::SeqCst) {
            return Err(EventBusError::Closed);
        }

        let partition = partition_for(event, self.inner.num_partitions)?;
        let envelope = event.to_envelope()?;
        let value = serde_json::to_vec(&envelope)?;

        let topic = self.topic(topic_name);
        topic.partitions[partition]
            .write()
            .unwrap()
            .push(Message { value });

        metrics::counter!("event_bus_published_total").increment(1);
        tracing::debug!(
            topic = topic_name,
            partition,
            event_type = event.event_type(),
            aggregate_id = %event.aggregate_id,
            "published event"
        );

        Ok(())
    }

    async fn subscribe(
        &self,
        topic_name: &str,
        group_id: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        if !self.inner.running.load(Ordering::SeqCst) {
            return Err(EventBusError::Closed);
        }

        let topic = self.topic(topic_name);

        let (group, first_member) = {
            let mut groups = topic.groups.write().unwrap();
            match groups.get(group_id) {
                Some(group) => (group.clone(), false),
                None => {
                    let group = Arc::new(GroupState {
                        members: RwLock::new(Vec::new()),
                        offsets: (0..self.inner.num_partitions)
                            .map(|_| Mutex::new(0))
                            .collect(),
                    });
                    groups.insert(group_id.to_string(), group.clone());
                    (group, true)
                }
            }
        };

        group.members.write().unwrap().push(handler);

        // Delivery loops exist per group, not per member; they look up the
        // assigned member each iteration so later joiners take over their
        // share of partitions.
        if first_member {
            for partition in 0..self.inner.num_partitions {
                Self::spawn_partition_loop(
                    self.inner.clone(),
                    topic.clone(),
                    group.clone(),
                    partition,
                );
            }
        }

        tracing::info!(topic = topic_name, group = group_id, "subscribed consumer");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::HandlerError;
    use common::{EventMetadata, PaymentId, SagaId, UserId};
    use domain::{EventPayload, Money};
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::AtomicUsize;

    struct Collector {
        events: Mutex<Vec<Event>>,
    }

    impl Collector {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn types(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.event_type().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl EventHandler for Collector {
        async fn handle(&self, event: Event) -> std::result::Result<(), HandlerError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    /// Fails the first `failures` deliveries, then records like Collector.
    struct Flaky {
        failures: AtomicUsize,
        seen: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for Flaky {
        async fn handle(&self, _event: Event) -> std::result::Result<(), HandlerError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err("transient".into());
            }
            Ok(())
        }
    }

    fn wallet_request(user: &str) -> Event {
        Event::wallet_payment_requested(
            PaymentId::new(),
            SagaId::new(),
            UserId::new(user),
            "svc",
            Money::from_cents(100),
            "USD",
            StdHashMap::new(),
            EventMetadata::new(),
        )
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..300 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 3s");
    }

    #[tokio::test]
    async fn delivers_published_events_to_subscriber() {
        let bus = InMemoryEventBus::new(4);
        let collector = Collector::new();
        bus.subscribe("t", "g", collector.clone()).await.unwrap();

        bus.publish("t", &wallet_request("user_1")).await.unwrap();

        eventually(|| collector.events.lock().unwrap().len() == 1).await;
        assert_eq!(collector.types(), vec!["WalletPaymentRequested"]);
        bus.close();
    }

    #[tokio::test]
    async fn preserves_order_within_one_key() {
        let bus = InMemoryEventBus::new(4);
        let collector = Collector::new();
        bus.subscribe("t", "g", collector.clone()).await.unwrap();

        let user = UserId::new("user_7");
        for i in 0..5 {
            let event = Event::funds_credited(
                uuid::Uuid::new_v4(),
                PaymentId::new(),
                user.clone(),
                Money::from_cents(i + 1),
                Money::from_cents(0),
                Money::from_cents(i + 1),
                "seed",
                EventMetadata::new(),
            );
            bus.publish("t", &event).await.unwrap();
        }

        eventually(|| collector.events.lock().unwrap().len() == 5).await;

        let amounts: Vec<i64> = collector
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|e| match &e.payload {
                EventPayload::FundsCredited(d) => d.amount.as_cents(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(amounts, vec![1, 2, 3, 4, 5]);
        bus.close();
    }

    #[tokio::test]
    async fn every_group_sees_every_event() {
        let bus = InMemoryEventBus::new(4);
        let first = Collector::new();
        let second = Collector::new();
        bus.subscribe("t", "g1", first.clone()).await.unwrap();
        bus.subscribe("t", "g2", second.clone()).await.unwrap();

        bus.publish("t", &wallet_request("user_1")).await.unwrap();
        bus.publish("t", &wallet_request("user_2")).await.unwrap();

        eventually(|| {
            first.events.lock().unwrap().len() == 2 && second.events.lock().unwrap().len() == 2
        })
        .await;
        bus.close();
    }

    #[tokio::test]
    async fn handler_failure_causes_redelivery() {
        let bus = InMemoryEventBus::new(2);
        let flaky = Arc::new(Flaky {
            failures: AtomicUsize::new(2),
            seen: AtomicUsize::new(0),
        });
        bus.subscribe("t", "g", flaky.clone()).await.unwrap();

        bus.publish("t", &wallet_request("user_1")).await.unwrap();

        eventually(|| flaky.seen.load(Ordering::SeqCst) >= 3).await;
        bus.close();
    }

    #[tokio::test]
    async fn poison_message_is_dropped_not_blocking() {
        let bus = InMemoryEventBus::new(4);
        let collector = Collector::new();
        bus.subscribe("t", "g", collector.clone()).await.unwrap();

        let good = wallet_request("user_1");
        let partition = partition_for(&good, 4).unwrap();
        bus.push_raw("t", partition, b"not json at all".to_vec());
        bus.publish("t", &good).await.unwrap();

        eventually(|| collector.events.lock().unwrap().len() == 1).await;
        assert_eq!(collector.types(), vec!["WalletPaymentRequested"]);
        bus.close();
    }

    #[tokio::test]
    async fn closed_bus_rejects_publish() {
        let bus = InMemoryEventBus::new(2);
        bus.close();
        let err = bus.publish("t", &wallet_request("u")).await.unwrap_err();
        assert!(matches!(err, EventBusError::Closed));
    }
}
