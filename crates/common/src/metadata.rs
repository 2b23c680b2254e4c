use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation metadata attached to every event.
///
/// The correlation id ties together all events of one payment flow; the
/// trace id ties a flow to the request trace that started it. Response
/// events copy the metadata of the event that triggered them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub correlation_id: Uuid,
    pub trace_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl EventMetadata {
    /// Creates fresh metadata for a new payment flow.
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            trace_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}
