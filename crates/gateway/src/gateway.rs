use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::PaymentId;
use domain::Money;
use thiserror::Error;
use uuid::Uuid;

/// A charge request as the gateway sees it.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub payment_id: PaymentId,
    pub amount: Money,
    pub currency: String,
    pub card_token: String,
}

/// The gateway's synchronous acknowledgement of a charge.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub gateway_payment_id: String,
    pub status: String,
    pub transaction_id: String,
}

/// Errors returned by the gateway itself. The per-attempt deadline lives
/// in the caller, so an unresponsive gateway surfaces as an elapsed
/// timeout, not as one of these.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway refused the payment; retrying will not help.
    #[error("gateway rejected payment: {0}")]
    Rejected(String),

    /// The gateway could not be reached.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// The opaque external payment gateway, specified only at this seam.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn process_payment(
        &self,
        request: GatewayRequest,
    ) -> std::result::Result<GatewayResponse, GatewayError>;
}

/// Scripted behavior for one mock gateway call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Responds `SUCCESS` after the configured latency.
    Succeed,
    /// Never responds within any sane deadline, so the caller's
    /// per-attempt timeout fires.
    Timeout,
    /// Rejects the payment with the given reason.
    Reject(String),
}

struct MockState {
    script: VecDeque<MockOutcome>,
    latency: Duration,
    calls: u32,
}

/// In-memory gateway for tests and local runs.
///
/// Consumes a scripted outcome per call and falls back to success once the
/// script is exhausted.
#[derive(Clone)]
pub struct MockPaymentGateway {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                script: VecDeque::new(),
                latency: Duration::from_millis(20),
                calls: 0,
            })),
        }
    }

    /// Queues outcomes for the next calls, in order.
    pub fn script(&self, outcomes: impl IntoIterator<Item = MockOutcome>) {
        self.state.lock().unwrap().script.extend(outcomes);
    }

    /// Overrides the simulated response latency.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = latency;
    }

    /// Number of calls the gateway has received.
    pub fn call_count(&self) -> u32 {
        self.state.lock().unwrap().calls
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn process_payment(
        &self,
        request: GatewayRequest,
    ) -> std::result::Result<GatewayResponse, GatewayError> {
        let (outcome, latency) = {
            let mut state = self.state.lock().unwrap();
            state.calls += 1;
            (
                state.script.pop_front().unwrap_or(MockOutcome::Succeed),
                state.latency,
            )
        };

        match outcome {
            MockOutcome::Succeed => {
                tokio::time::sleep(latency).await;
                Ok(GatewayResponse {
                    gateway_payment_id: format!("gateway_{}", request.payment_id),
                    status: "SUCCESS".to_string(),
                    transaction_id: format!("txn_{}", Uuid::new_v4().simple()),
                })
            }
            MockOutcome::Timeout => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(GatewayError::Unavailable("no response".to_string()))
            }
            MockOutcome::Reject(reason) => {
                tokio::time::sleep(latency).await;
                Err(GatewayError::Rejected(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GatewayRequest {
        GatewayRequest {
            payment_id: PaymentId::new(),
            amount: Money::from_cents(2000),
            currency: "USD".to_string(),
            card_token: "tok_1".to_string(),
        }
    }

    #[tokio::test]
    async fn defaults_to_success() {
        let gateway = MockPaymentGateway::new();
        gateway.set_latency(Duration::from_millis(1));

        let response = gateway.process_payment(request()).await.unwrap();
        assert_eq!(response.status, "SUCCESS");
        assert!(response.transaction_id.starts_with("txn_"));
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn consumes_script_in_order() {
        let gateway = MockPaymentGateway::new();
        gateway.set_latency(Duration::from_millis(1));
        gateway.script([MockOutcome::Reject("card_declined".to_string())]);

        let err = gateway.process_payment(request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(reason) if reason == "card_declined"));

        // Script exhausted: back to success.
        assert!(gateway.process_payment(request()).await.is_ok());
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn timeout_outcome_outlives_caller_deadlines() {
        let gateway = MockPaymentGateway::new();
        gateway.script([MockOutcome::Timeout]);

        let result =
            tokio::time::timeout(Duration::from_millis(30), gateway.process_payment(request()))
                .await;
        assert!(result.is_err());
    }
}
