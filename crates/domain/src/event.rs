//! The closed event set and its envelope conversions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{AggregateId, EventId, EventMetadata, PaymentId, SagaId, UserId};
use event_store::EventEnvelope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, Result};
use crate::money::Money;

/// Gateway status value that classifies an external payment as successful.
pub const GATEWAY_STATUS_SUCCESS: &str = "SUCCESS";

/// The aggregate a given event belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateType {
    Payment,
    Wallet,
    /// Preserved for events whose type is not in the closed set.
    Other(String),
}

impl AggregateType {
    pub fn as_str(&self) -> &str {
        match self {
            AggregateType::Payment => "Payment",
            AggregateType::Wallet => "Wallet",
            AggregateType::Other(name) => name,
        }
    }
}

impl From<&str> for AggregateType {
    fn from(name: &str) -> Self {
        match name {
            "Payment" => AggregateType::Payment,
            "Wallet" => AggregateType::Wallet,
            other => AggregateType::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// -- Payload structs, one per event type --

/// A client asked for a wallet-funded payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletPaymentRequestedData {
    pub payment_id: PaymentId,
    pub saga_id: SagaId,
    pub user_id: UserId,
    pub service_id: String,
    pub amount: Money,
    pub currency: String,
    /// Generated once at creation; consumers deduplicate repeated delivery.
    pub idempotency_key: Uuid,
    pub metadata: HashMap<String, String>,
}

/// A client asked for a card-funded payment through the external gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalPaymentRequestedData {
    pub payment_id: PaymentId,
    pub saga_id: SagaId,
    pub user_id: UserId,
    pub service_id: String,
    pub amount: Money,
    pub currency: String,
    pub card_token: String,
    pub idempotency_key: Uuid,
    pub metadata: HashMap<String, String>,
}

/// The gateway accepted the payment for processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSentToGatewayData {
    pub payment_id: PaymentId,
    pub saga_id: SagaId,
    pub gateway_provider: String,
    pub gateway_payment_id: String,
    pub sent_at: DateTime<Utc>,
}

/// The gateway's asynchronous verdict on a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentGatewayResponseData {
    pub payment_id: PaymentId,
    pub saga_id: SagaId,
    pub gateway_provider: String,
    /// `"SUCCESS"` or a rejection classification from the gateway.
    pub status: String,
    pub transaction_id: String,
    pub responded_at: DateTime<Utc>,
}

/// One gateway attempt hit its deadline. Bookkeeping only; does not move
/// the saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentGatewayTimeoutData {
    pub payment_id: PaymentId,
    pub saga_id: SagaId,
    pub gateway_provider: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub timeout_seconds: u64,
    pub timed_out_at: DateTime<Utc>,
}

/// A further gateway attempt was scheduled. Bookkeeping only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRetryRequestedData {
    pub payment_id: PaymentId,
    pub saga_id: SagaId,
    pub attempt: u32,
    pub previous_attempt: u32,
    pub previous_error: String,
    pub next_retry_at: DateTime<Utc>,
}

/// Terminal outcome of a wallet payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletPaymentCompletedData {
    pub payment_id: PaymentId,
    pub saga_id: SagaId,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub completed_at: DateTime<Utc>,
    pub gateway_provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletPaymentFailedData {
    pub payment_id: PaymentId,
    pub saga_id: SagaId,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Terminal outcome of an external payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalPaymentCompletedData {
    pub payment_id: PaymentId,
    pub saga_id: SagaId,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub completed_at: DateTime<Utc>,
    pub gateway_provider: String,
    pub transaction_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalPaymentFailedData {
    pub payment_id: PaymentId,
    pub saga_id: SagaId,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
    pub gateway_provider: String,
}

/// Funds left a wallet. Aggregate key is the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundsDebitedData {
    pub payment_id: PaymentId,
    pub user_id: UserId,
    pub amount: Money,
    pub previous_balance: Money,
    pub new_balance: Money,
    pub payment_type: String,
    pub debited_at: DateTime<Utc>,
}

/// Funds entered a wallet, either seeding or a refund credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundsCreditedData {
    pub refund_id: Uuid,
    pub payment_id: PaymentId,
    pub user_id: UserId,
    pub amount: Money,
    pub previous_balance: Money,
    pub new_balance: Money,
    pub reason: String,
    pub credited_at: DateTime<Utc>,
}

/// A debit was refused for lack of balance. A business outcome, not an
/// error: the wallet handler commits its offset after emitting this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundsInsufficientData {
    pub payment_id: PaymentId,
    pub user_id: UserId,
    pub requested_amount: Money,
    pub available_balance: Money,
    pub payment_type: String,
}

/// Tagged union over the closed event set.
///
/// Folders pattern-match on the tag; unknown tags are preserved verbatim in
/// [`EventPayload::Unknown`] and ignored by every folder.
#[derive(Debug, Clone)]
pub enum EventPayload {
    WalletPaymentRequested(WalletPaymentRequestedData),
    ExternalPaymentRequested(ExternalPaymentRequestedData),
    PaymentSentToGateway(PaymentSentToGatewayData),
    PaymentGatewayResponse(PaymentGatewayResponseData),
    PaymentGatewayTimeout(PaymentGatewayTimeoutData),
    PaymentRetryRequested(PaymentRetryRequestedData),
    WalletPaymentCompleted(WalletPaymentCompletedData),
    WalletPaymentFailed(WalletPaymentFailedData),
    ExternalPaymentCompleted(ExternalPaymentCompletedData),
    ExternalPaymentFailed(ExternalPaymentFailedData),
    FundsDebited(FundsDebitedData),
    FundsCredited(FundsCreditedData),
    FundsInsufficient(FundsInsufficientData),
    Unknown {
        event_type: String,
        data: serde_json::Value,
    },
}

impl EventPayload {
    /// Returns the event type tag.
    pub fn event_type(&self) -> &str {
        match self {
            EventPayload::WalletPaymentRequested(_) => "WalletPaymentRequested",
            EventPayload::ExternalPaymentRequested(_) => "ExternalPaymentRequested",
            EventPayload::PaymentSentToGateway(_) => "PaymentSentToGateway",
            EventPayload::PaymentGatewayResponse(_) => "PaymentGatewayResponse",
            EventPayload::PaymentGatewayTimeout(_) => "PaymentGatewayTimeout",
            EventPayload::PaymentRetryRequested(_) => "PaymentRetryRequested",
            EventPayload::WalletPaymentCompleted(_) => "WalletPaymentCompleted",
            EventPayload::WalletPaymentFailed(_) => "WalletPaymentFailed",
            EventPayload::ExternalPaymentCompleted(_) => "ExternalPaymentCompleted",
            EventPayload::ExternalPaymentFailed(_) => "ExternalPaymentFailed",
            EventPayload::FundsDebited(_) => "FundsDebited",
            EventPayload::FundsCredited(_) => "FundsCredited",
            EventPayload::FundsInsufficient(_) => "FundsInsufficient",
            EventPayload::Unknown { event_type, .. } => event_type,
        }
    }

    /// Closed dispatch from a type tag and raw JSON to a typed payload.
    ///
    /// Tags outside the closed set deserialize into [`EventPayload::Unknown`]
    /// so they survive replication without being interpreted.
    pub fn decode(event_type: &str, data: serde_json::Value) -> Result<Self> {
        let payload = match event_type {
            "WalletPaymentRequested" => {
                EventPayload::WalletPaymentRequested(serde_json::from_value(data)?)
            }
            "ExternalPaymentRequested" => {
                EventPayload::ExternalPaymentRequested(serde_json::from_value(data)?)
            }
            "PaymentSentToGateway" => {
                EventPayload::PaymentSentToGateway(serde_json::from_value(data)?)
            }
            "PaymentGatewayResponse" => {
                EventPayload::PaymentGatewayResponse(serde_json::from_value(data)?)
            }
            "PaymentGatewayTimeout" => {
                EventPayload::PaymentGatewayTimeout(serde_json::from_value(data)?)
            }
            "PaymentRetryRequested" => {
                EventPayload::PaymentRetryRequested(serde_json::from_value(data)?)
            }
            "WalletPaymentCompleted" => {
                EventPayload::WalletPaymentCompleted(serde_json::from_value(data)?)
            }
            "WalletPaymentFailed" => {
                EventPayload::WalletPaymentFailed(serde_json::from_value(data)?)
            }
            "ExternalPaymentCompleted" => {
                EventPayload::ExternalPaymentCompleted(serde_json::from_value(data)?)
            }
            "ExternalPaymentFailed" => {
                EventPayload::ExternalPaymentFailed(serde_json::from_value(data)?)
            }
            "FundsDebited" => EventPayload::FundsDebited(serde_json::from_value(data)?),
            "FundsCredited" => EventPayload::FundsCredited(serde_json::from_value(data)?),
            "FundsInsufficient" => EventPayload::FundsInsufficient(serde_json::from_value(data)?),
            other => EventPayload::Unknown {
                event_type: other.to_string(),
                data,
            },
        };
        Ok(payload)
    }

    /// Serializes the payload back to raw JSON.
    pub fn encode(&self) -> Result<serde_json::Value> {
        let value = match self {
            EventPayload::WalletPaymentRequested(data) => serde_json::to_value(data)?,
            EventPayload::ExternalPaymentRequested(data) => serde_json::to_value(data)?,
            EventPayload::PaymentSentToGateway(data) => serde_json::to_value(data)?,
            EventPayload::PaymentGatewayResponse(data) => serde_json::to_value(data)?,
            EventPayload::PaymentGatewayTimeout(data) => serde_json::to_value(data)?,
            EventPayload::PaymentRetryRequested(data) => serde_json::to_value(data)?,
            EventPayload::WalletPaymentCompleted(data) => serde_json::to_value(data)?,
            EventPayload::WalletPaymentFailed(data) => serde_json::to_value(data)?,
            EventPayload::ExternalPaymentCompleted(data) => serde_json::to_value(data)?,
            EventPayload::ExternalPaymentFailed(data) => serde_json::to_value(data)?,
            EventPayload::FundsDebited(data) => serde_json::to_value(data)?,
            EventPayload::FundsCredited(data) => serde_json::to_value(data)?,
            EventPayload::FundsInsufficient(data) => serde_json::to_value(data)?,
            EventPayload::Unknown { data, .. } => data.clone(),
        };
        Ok(value)
    }

    /// Extracts the user id for events that carry one (the wallet family).
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            EventPayload::WalletPaymentRequested(d) => Some(&d.user_id),
            EventPayload::WalletPaymentCompleted(d) => Some(&d.user_id),
            EventPayload::WalletPaymentFailed(d) => Some(&d.user_id),
            EventPayload::FundsDebited(d) => Some(&d.user_id),
            EventPayload::FundsCredited(d) => Some(&d.user_id),
            EventPayload::FundsInsufficient(d) => Some(&d.user_id),
            _ => None,
        }
    }

    /// Extracts the payment id for events that carry one.
    pub fn payment_id(&self) -> Option<PaymentId> {
        match self {
            EventPayload::WalletPaymentRequested(d) => Some(d.payment_id),
            EventPayload::ExternalPaymentRequested(d) => Some(d.payment_id),
            EventPayload::PaymentSentToGateway(d) => Some(d.payment_id),
            EventPayload::PaymentGatewayResponse(d) => Some(d.payment_id),
            EventPayload::PaymentGatewayTimeout(d) => Some(d.payment_id),
            EventPayload::PaymentRetryRequested(d) => Some(d.payment_id),
            EventPayload::WalletPaymentCompleted(d) => Some(d.payment_id),
            EventPayload::WalletPaymentFailed(d) => Some(d.payment_id),
            EventPayload::ExternalPaymentCompleted(d) => Some(d.payment_id),
            EventPayload::ExternalPaymentFailed(d) => Some(d.payment_id),
            EventPayload::FundsDebited(d) => Some(d.payment_id),
            EventPayload::FundsCredited(d) => Some(d.payment_id),
            EventPayload::FundsInsufficient(d) => Some(d.payment_id),
            EventPayload::Unknown { .. } => None,
        }
    }

    /// Extracts the saga id for events that carry one.
    pub fn saga_id(&self) -> Option<SagaId> {
        match self {
            EventPayload::WalletPaymentRequested(d) => Some(d.saga_id),
            EventPayload::ExternalPaymentRequested(d) => Some(d.saga_id),
            EventPayload::PaymentSentToGateway(d) => Some(d.saga_id),
            EventPayload::PaymentGatewayResponse(d) => Some(d.saga_id),
            EventPayload::PaymentGatewayTimeout(d) => Some(d.saga_id),
            EventPayload::PaymentRetryRequested(d) => Some(d.saga_id),
            EventPayload::WalletPaymentCompleted(d) => Some(d.saga_id),
            EventPayload::WalletPaymentFailed(d) => Some(d.saga_id),
            EventPayload::ExternalPaymentCompleted(d) => Some(d.saga_id),
            EventPayload::ExternalPaymentFailed(d) => Some(d.saga_id),
            _ => None,
        }
    }
}

/// An event with its typed payload, ready for folding and publication.
///
/// The envelope form (opaque payload bytes) lives in `event-store`; this is
/// the shape every handler works with.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: EventId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: AggregateType,
    /// Payload schema version, >= 1.
    pub version: i32,
    pub payload: EventPayload,
    pub metadata: EventMetadata,
    pub timestamp: DateTime<Utc>,
    /// Log-assigned order; zero until appended.
    pub sequence_number: i64,
}

impl Event {
    /// Returns the event type tag.
    pub fn event_type(&self) -> &str {
        self.payload.event_type()
    }

    /// Interprets a stored envelope into a typed event.
    pub fn from_envelope(envelope: EventEnvelope) -> Result<Self> {
        let payload = EventPayload::decode(&envelope.event_type, envelope.payload)?;
        Ok(Self {
            id: envelope.event_id,
            aggregate_id: envelope.aggregate_id,
            aggregate_type: AggregateType::from(envelope.aggregate_type.as_str()),
            version: envelope.version,
            payload,
            metadata: envelope.metadata,
            timestamp: envelope.timestamp,
            sequence_number: envelope.sequence_number,
        })
    }

    /// Converts the event back into its storage/wire envelope.
    pub fn to_envelope(&self) -> Result<EventEnvelope> {
        Ok(EventEnvelope {
            event_id: self.id,
            event_type: self.event_type().to_string(),
            aggregate_id: self.aggregate_id.clone(),
            aggregate_type: self.aggregate_type.as_str().to_string(),
            version: self.version,
            payload: self.payload.encode()?,
            metadata: self.metadata.clone(),
            timestamp: self.timestamp,
            sequence_number: self.sequence_number,
        })
    }

    fn payment_event(payment_id: PaymentId, payload: EventPayload, metadata: EventMetadata) -> Self {
        Self {
            id: EventId::new(),
            aggregate_id: payment_id.into(),
            aggregate_type: AggregateType::Payment,
            version: 1,
            payload,
            metadata,
            timestamp: Utc::now(),
            sequence_number: 0,
        }
    }

    fn wallet_event(user_id: &UserId, payload: EventPayload, metadata: EventMetadata) -> Self {
        Self {
            id: EventId::new(),
            aggregate_id: user_id.into(),
            aggregate_type: AggregateType::Wallet,
            version: 1,
            payload,
            metadata,
            timestamp: Utc::now(),
            sequence_number: 0,
        }
    }

    // -- Constructors, one per event type --

    #[allow(clippy::too_many_arguments)]
    pub fn wallet_payment_requested(
        payment_id: PaymentId,
        saga_id: SagaId,
        user_id: UserId,
        service_id: impl Into<String>,
        amount: Money,
        currency: impl Into<String>,
        client_metadata: HashMap<String, String>,
        metadata: EventMetadata,
    ) -> Self {
        Self::payment_event(
            payment_id,
            EventPayload::WalletPaymentRequested(WalletPaymentRequestedData {
                payment_id,
                saga_id,
                user_id,
                service_id: service_id.into(),
                amount,
                currency: currency.into(),
                idempotency_key: Uuid::new_v4(),
                metadata: client_metadata,
            }),
            metadata,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn external_payment_requested(
        payment_id: PaymentId,
        saga_id: SagaId,
        user_id: UserId,
        service_id: impl Into<String>,
        amount: Money,
        currency: impl Into<String>,
        card_token: impl Into<String>,
        client_metadata: HashMap<String, String>,
        metadata: EventMetadata,
    ) -> Self {
        Self::payment_event(
            payment_id,
            EventPayload::ExternalPaymentRequested(ExternalPaymentRequestedData {
                payment_id,
                saga_id,
                user_id,
                service_id: service_id.into(),
                amount,
                currency: currency.into(),
                card_token: card_token.into(),
                idempotency_key: Uuid::new_v4(),
                metadata: client_metadata,
            }),
            metadata,
        )
    }

    pub fn payment_sent_to_gateway(
        payment_id: PaymentId,
        saga_id: SagaId,
        gateway_provider: impl Into<String>,
        gateway_payment_id: impl Into<String>,
        metadata: EventMetadata,
    ) -> Self {
        Self::payment_event(
            payment_id,
            EventPayload::PaymentSentToGateway(PaymentSentToGatewayData {
                payment_id,
                saga_id,
                gateway_provider: gateway_provider.into(),
                gateway_payment_id: gateway_payment_id.into(),
                sent_at: Utc::now(),
            }),
            metadata,
        )
    }

    pub fn payment_gateway_response(
        payment_id: PaymentId,
        saga_id: SagaId,
        gateway_provider: impl Into<String>,
        status: impl Into<String>,
        transaction_id: impl Into<String>,
        metadata: EventMetadata,
    ) -> Self {
        Self::payment_event(
            payment_id,
            EventPayload::PaymentGatewayResponse(PaymentGatewayResponseData {
                payment_id,
                saga_id,
                gateway_provider: gateway_provider.into(),
                status: status.into(),
                transaction_id: transaction_id.into(),
                responded_at: Utc::now(),
            }),
            metadata,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn payment_gateway_timeout(
        payment_id: PaymentId,
        saga_id: SagaId,
        gateway_provider: impl Into<String>,
        attempt: u32,
        max_attempts: u32,
        timeout_seconds: u64,
        metadata: EventMetadata,
    ) -> Self {
        Self::payment_event(
            payment_id,
            EventPayload::PaymentGatewayTimeout(PaymentGatewayTimeoutData {
                payment_id,
                saga_id,
                gateway_provider: gateway_provider.into(),
                attempt,
                max_attempts,
                timeout_seconds,
                timed_out_at: Utc::now(),
            }),
            metadata,
        )
    }

    pub fn payment_retry_requested(
        payment_id: PaymentId,
        saga_id: SagaId,
        attempt: u32,
        previous_error: impl Into<String>,
        next_retry_at: DateTime<Utc>,
        metadata: EventMetadata,
    ) -> Self {
        Self::payment_event(
            payment_id,
            EventPayload::PaymentRetryRequested(PaymentRetryRequestedData {
                payment_id,
                saga_id,
                attempt,
                previous_attempt: attempt - 1,
                previous_error: previous_error.into(),
                next_retry_at,
            }),
            metadata,
        )
    }

    pub fn wallet_payment_completed(
        payment_id: PaymentId,
        saga_id: SagaId,
        user_id: UserId,
        amount: Money,
        currency: impl Into<String>,
        metadata: EventMetadata,
    ) -> Self {
        Self::payment_event(
            payment_id,
            EventPayload::WalletPaymentCompleted(WalletPaymentCompletedData {
                payment_id,
                saga_id,
                user_id,
                amount,
                currency: currency.into(),
                completed_at: Utc::now(),
                gateway_provider: "wallet".to_string(),
            }),
            metadata,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn wallet_payment_failed(
        payment_id: PaymentId,
        saga_id: SagaId,
        user_id: UserId,
        amount: Money,
        currency: impl Into<String>,
        reason: impl Into<String>,
        metadata: EventMetadata,
    ) -> Self {
        Self::payment_event(
            payment_id,
            EventPayload::WalletPaymentFailed(WalletPaymentFailedData {
                payment_id,
                saga_id,
                user_id,
                amount,
                currency: currency.into(),
                reason: reason.into(),
                failed_at: Utc::now(),
            }),
            metadata,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn external_payment_completed(
        payment_id: PaymentId,
        saga_id: SagaId,
        user_id: UserId,
        amount: Money,
        currency: impl Into<String>,
        gateway_provider: impl Into<String>,
        transaction_id: impl Into<String>,
        metadata: EventMetadata,
    ) -> Self {
        Self::payment_event(
            payment_id,
            EventPayload::ExternalPaymentCompleted(ExternalPaymentCompletedData {
                payment_id,
                saga_id,
                user_id,
                amount,
                currency: currency.into(),
                completed_at: Utc::now(),
                gateway_provider: gateway_provider.into(),
                transaction_id: transaction_id.into(),
            }),
            metadata,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn external_payment_failed(
        payment_id: PaymentId,
        saga_id: SagaId,
        user_id: UserId,
        amount: Money,
        currency: impl Into<String>,
        reason: impl Into<String>,
        gateway_provider: impl Into<String>,
        metadata: EventMetadata,
    ) -> Self {
        Self::payment_event(
            payment_id,
            EventPayload::ExternalPaymentFailed(ExternalPaymentFailedData {
                payment_id,
                saga_id,
                user_id,
                amount,
                currency: currency.into(),
                reason: reason.into(),
                failed_at: Utc::now(),
                gateway_provider: gateway_provider.into(),
            }),
            metadata,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn funds_debited(
        payment_id: PaymentId,
        user_id: UserId,
        amount: Money,
        previous_balance: Money,
        new_balance: Money,
        metadata: EventMetadata,
    ) -> Self {
        let aggregate_user = user_id.clone();
        Self::wallet_event(
            &aggregate_user,
            EventPayload::FundsDebited(FundsDebitedData {
                payment_id,
                user_id,
                amount,
                previous_balance,
                new_balance,
                payment_type: "wallet".to_string(),
                debited_at: Utc::now(),
            }),
            metadata,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn funds_credited(
        refund_id: Uuid,
        payment_id: PaymentId,
        user_id: UserId,
        amount: Money,
        previous_balance: Money,
        new_balance: Money,
        reason: impl Into<String>,
        metadata: EventMetadata,
    ) -> Self {
        let aggregate_user = user_id.clone();
        Self::wallet_event(
            &aggregate_user,
            EventPayload::FundsCredited(FundsCreditedData {
                refund_id,
                payment_id,
                user_id,
                amount,
                previous_balance,
                new_balance,
                reason: reason.into(),
                credited_at: Utc::now(),
            }),
            metadata,
        )
    }

    pub fn funds_insufficient(
        payment_id: PaymentId,
        user_id: UserId,
        requested_amount: Money,
        available_balance: Money,
        metadata: EventMetadata,
    ) -> Self {
        let aggregate_user = user_id.clone();
        Self::wallet_event(
            &aggregate_user,
            EventPayload::FundsInsufficient(FundsInsufficientData {
                payment_id,
                user_id,
                requested_amount,
                available_balance,
                payment_type: "wallet".to_string(),
            }),
            metadata,
        )
    }
}

/// Interprets a batch of envelopes, as returned by the log, into typed
/// events. Fails on the first malformed payload.
pub fn from_envelopes(envelopes: Vec<EventEnvelope>) -> Result<Vec<Event>> {
    envelopes.into_iter().map(Event::from_envelope).collect()
}

impl TryFrom<EventEnvelope> for Event {
    type Error = DomainError;

    fn try_from(envelope: EventEnvelope) -> Result<Self> {
        Event::from_envelope(envelope)
    }
}
