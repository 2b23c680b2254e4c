use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use domain::Event;
use tokio::sync::Notify;

use crate::error::{DlqError, Result};
use crate::record::DeadLetterRecord;

/// Default capacity of the in-memory ring.
const DEFAULT_MAX_EVENTS: usize = 10_000;

/// Fallback poll interval when no publish notification arrives.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A consumer of dead-letter records.
#[async_trait]
pub trait DeadLetterHandler: Send + Sync {
    async fn handle(
        &self,
        record: DeadLetterRecord,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// The dead-letter seam used by participants that give up on an event.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Stores a dead-letter record and wakes all subscribers.
    async fn publish(
        &self,
        original_event: Event,
        failure_reason: &str,
        consumer_group: &str,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<()>;

    /// Registers a handler and starts a cooperative poll loop delivering
    /// every record the handler has not yet seen, backlog included.
    async fn subscribe(&self, handler: Arc<dyn DeadLetterHandler>) -> Result<()>;
}

struct Subscriber {
    handler: Arc<dyn DeadLetterHandler>,
    /// Next unseen publication number. Monotonic, so discarding old ring
    /// entries never invalidates it.
    position: Arc<Mutex<u64>>,
}

struct SinkInner {
    /// Records paired with their publication number.
    records: Mutex<VecDeque<(u64, DeadLetterRecord)>>,
    next_seq: Mutex<u64>,
    subscribers: RwLock<Vec<Subscriber>>,
    notify: Notify,
    running: AtomicBool,
    max_events: usize,
}

/// Bounded in-memory dead-letter ring with subscriber fan-out.
///
/// When the ring is full the oldest 10% of records are discarded; the
/// error-log table (fed by a subscriber) remains the authoritative record.
#[derive(Clone)]
pub struct DeadLetterQueue {
    inner: Arc<SinkInner>,
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS)
    }
}

impl DeadLetterQueue {
    /// Creates a ring retaining at most `max_events` records.
    pub fn new(max_events: usize) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                records: Mutex::new(VecDeque::new()),
                next_seq: Mutex::new(0),
                subscribers: RwLock::new(Vec::new()),
                notify: Notify::new(),
                running: AtomicBool::new(true),
                max_events,
            }),
        }
    }

    /// Stops all subscriber loops and rejects further publishes.
    pub fn close(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Snapshot of the retained records, oldest first.
    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.inner
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|(_, record)| record.clone())
            .collect()
    }

    fn spawn_subscriber_loop(inner: Arc<SinkInner>, subscriber_index: usize) {
        tokio::spawn(async move {
            loop {
                if !inner.running.load(Ordering::SeqCst) {
                    return;
                }

                let (handler, position) = {
                    let subscribers = inner.subscribers.read().unwrap();
                    let sub = &subscribers[subscriber_index];
                    (sub.handler.clone(), sub.position.clone())
                };

                let pos = *position.lock().unwrap();
                let next = {
                    let records = inner.records.lock().unwrap();
                    records
                        .iter()
                        .find(|(seq, _)| *seq >= pos)
                        .map(|(seq, record)| (*seq, record.clone()))
                };

                match next {
                    Some((seq, record)) => {
                        if let Err(err) = handler.handle(record).await {
                            tracing::warn!(%err, "dead-letter handler failed");
                        }
                        // Delivery to subscribers is best-effort; the record
                        // stays in the ring either way.
                        *position.lock().unwrap() = seq + 1;
                    }
                    None => {
                        tokio::select! {
                            _ = inner.notify.notified() => {}
                            _ = tokio::time::sleep(POLL_INTERVAL) => {}
                        }
                    }
                }
            }
        });
    }
}

#[async_trait]
impl DeadLetterSink for DeadLetterQueue {
    async fn publish(
        &self,
        original_event: Event,
        failure_reason: &str,
        consumer_group: &str,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<()> {
        if !self.inner.running.load(Ordering::SeqCst) {
            return Err(DlqError::Closed);
        }

        let record = DeadLetterRecord::new(
            original_event,
            failure_reason,
            consumer_group,
            topic,
            partition,
            offset,
        );

        tracing::error!(
            dlq_event_id = record.dlq_event_id,
            event_type = record.original_event.event_type(),
            reason = record.failure_reason,
            error_type = %record.error_type,
            consumer_group,
            "event dead-lettered"
        );
        metrics::counter!("dlq_records_total").increment(1);

        {
            let mut records = self.inner.records.lock().unwrap();
            if records.len() >= self.inner.max_events {
                let drop_count = self.inner.max_events / 10;
                let len = records.len();
                records.drain(..drop_count.min(len));
                metrics::counter!("dlq_records_dropped_total").increment(drop_count as u64);
            }
            let mut next_seq = self.inner.next_seq.lock().unwrap();
            records.push_back((*next_seq, record));
            *next_seq += 1;
        }

        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(&self, handler: Arc<dyn DeadLetterHandler>) -> Result<()> {
        if !self.inner.running.load(Ordering::SeqCst) {
            return Err(DlqError::Closed);
        }

        let index = {
            let mut subscribers = self.inner.subscribers.write().unwrap();
            subscribers.push(Subscriber {
                handler,
                position: Arc::new(Mutex::new(0)),
            });
            subscribers.len() - 1
        };

        Self::spawn_subscriber_loop(self.inner.clone(), index);
        Ok(())
    }
}
