use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use tokio::sync::RwLock;

use crate::{EventEnvelope, EventStoreError, Result, store::EventStore};

#[derive(Default)]
struct LogState {
    events: Vec<EventEnvelope>,
    next_sequence: i64,
}

/// In-memory event log for tests and brokerless local runs.
///
/// Provides the same contract as the PostgreSQL implementation: a global
/// monotonic sequence assigned under the write lock, and duplicate event
/// ids rejected with `Conflict`.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    state: Arc<RwLock<LogState>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, mut event: EventEnvelope) -> Result<i64> {
        let mut state = self.state.write().await;

        if state.events.iter().any(|e| e.event_id == event.event_id) {
            return Err(EventStoreError::Conflict(event.event_id));
        }

        state.next_sequence += 1;
        event.sequence_number = state.next_sequence;
        let sequence = event.sequence_number;
        state.events.push(event);

        Ok(sequence)
    }

    async fn load(&self, aggregate_id: &AggregateId) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        let mut events: Vec<_> = state
            .events
            .iter()
            .filter(|e| &e.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence_number);
        Ok(events)
    }
}
