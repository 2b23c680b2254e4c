use chrono::{DateTime, Utc};
use domain::Event;
use uuid::Uuid;

/// Closed classification of why an event was dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    TimeoutMaxRetries,
    GatewayTimeout,
    GatewayRejected,
    InsufficientFunds,
    SchemaValidation,
    Unknown,
}

impl ErrorType {
    /// Classifies a free-form failure reason into the closed set.
    pub fn classify(failure_reason: &str) -> Self {
        match failure_reason {
            "MAX_RETRIES_EXCEEDED" => ErrorType::TimeoutMaxRetries,
            "GATEWAY_TIMEOUT" => ErrorType::GatewayTimeout,
            "GATEWAY_REJECTED" => ErrorType::GatewayRejected,
            "INSUFFICIENT_FUNDS" => ErrorType::InsufficientFunds,
            "SCHEMA_VALIDATION_FAILED" => ErrorType::SchemaValidation,
            _ => ErrorType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::TimeoutMaxRetries => "TIMEOUT_MAX_RETRIES",
            ErrorType::GatewayTimeout => "GATEWAY_TIMEOUT",
            ErrorType::GatewayRejected => "GATEWAY_REJECTED",
            ErrorType::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorType::SchemaValidation => "SCHEMA_VALIDATION",
            ErrorType::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dead-lettered event with its failure context, kept verbatim for
/// operator forensics.
#[derive(Debug, Clone)]
pub struct DeadLetterRecord {
    pub dlq_event_id: String,
    pub original_event: Event,
    pub failure_reason: String,
    pub error_type: ErrorType,
    pub failure_count: u32,
    pub first_failure_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub consumer_group: String,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub error_details: serde_json::Value,
}

impl DeadLetterRecord {
    pub fn new(
        original_event: Event,
        failure_reason: impl Into<String>,
        consumer_group: impl Into<String>,
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
    ) -> Self {
        let failure_reason = failure_reason.into();
        let now = Utc::now();
        Self {
            dlq_event_id: format!("dlq_{}_{}", Uuid::new_v4().simple(), original_event.id),
            error_type: ErrorType::classify(&failure_reason),
            original_event,
            failure_reason,
            failure_count: 1,
            first_failure_at: now,
            last_attempt_at: now,
            consumer_group: consumer_group.into(),
            topic: topic.into(),
            partition,
            offset,
            error_details: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}
