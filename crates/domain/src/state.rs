//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a payment saga.
///
/// ```text
/// INITIALIZED ──WalletPaymentRequested──▶ VALIDATING_BALANCE ──▶ COMPLETED | FAILED
/// INITIALIZED ──ExternalPaymentRequested─▶ SENDING_TO_GATEWAY ──▶ SENT_TO_GATEWAY
///                                          ──▶ AWAITING_RESPONSE ──▶ COMPLETED | FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// The saga exists but no request event has been applied yet.
    #[default]
    #[serde(rename = "INITIALIZED")]
    Initialized,

    /// A wallet payment is waiting for the wallet service's verdict.
    #[serde(rename = "VALIDATING_BALANCE")]
    ValidatingBalance,

    /// An external payment is being driven towards the gateway.
    #[serde(rename = "SENDING_TO_GATEWAY")]
    SendingToGateway,

    /// The gateway accepted the payment; a response is pending.
    #[serde(rename = "SENT_TO_GATEWAY")]
    SentToGateway,

    /// The gateway responded; the orchestrator will classify the outcome.
    #[serde(rename = "AWAITING_RESPONSE")]
    AwaitingResponse,

    /// Terminal success.
    #[serde(rename = "COMPLETED")]
    Completed,

    /// Terminal failure.
    #[serde(rename = "FAILED")]
    Failed,
}

impl SagaState {
    /// Returns true if the transition to `target` is allowed.
    ///
    /// Terminal states allow no transitions at all.
    pub fn can_transition_to(&self, target: SagaState) -> bool {
        use SagaState::*;
        matches!(
            (self, target),
            (Initialized, ValidatingBalance)
                | (Initialized, SendingToGateway)
                | (ValidatingBalance, Completed)
                | (ValidatingBalance, Failed)
                | (SendingToGateway, SentToGateway)
                | (SentToGateway, AwaitingResponse)
                | (AwaitingResponse, Completed)
                | (AwaitingResponse, Failed)
        )
    }

    /// Returns true if no further transitions are accepted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Initialized => "INITIALIZED",
            SagaState::ValidatingBalance => "VALIDATING_BALANCE",
            SagaState::SendingToGateway => "SENDING_TO_GATEWAY",
            SagaState::SentToGateway => "SENT_TO_GATEWAY",
            SagaState::AwaitingResponse => "AWAITING_RESPONSE",
            SagaState::Completed => "COMPLETED",
            SagaState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
