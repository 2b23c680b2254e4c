use chrono::{DateTime, Utc};
use common::{AggregateId, EventId, EventMetadata};
use serde::{Deserialize, Serialize};

/// A stored event together with everything the log knows about it.
///
/// The payload is opaque JSON at this layer; the `domain` crate interprets
/// it per event type. The serde representation of the envelope is exactly
/// the wire format used on the event bus:
///
/// ```json
/// {"id": ..., "type": ..., "aggregate_id": ..., "aggregate_type": ...,
///  "version": ..., "data": ..., "metadata": ..., "timestamp": ...,
///  "sequence_number": ...}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier of this event; duplicate appends are rejected.
    #[serde(rename = "id")]
    pub event_id: EventId,

    /// Tag from the closed event-type set (e.g. `"WalletPaymentRequested"`).
    #[serde(rename = "type")]
    pub event_type: String,

    /// Log key: payment id for payment-aggregate events, user id for
    /// wallet-aggregate events.
    pub aggregate_id: AggregateId,

    /// `"Payment"` or `"Wallet"`.
    pub aggregate_type: String,

    /// Schema version of the payload, >= 1.
    pub version: i32,

    /// Event-type-specific payload.
    #[serde(rename = "data")]
    pub payload: serde_json::Value,

    /// Correlation metadata.
    pub metadata: EventMetadata,

    /// When the event was created by its producer.
    pub timestamp: DateTime<Utc>,

    /// Monotonic per-log order, assigned by the store on append.
    /// Zero until the event has been persisted.
    pub sequence_number: i64,
}
