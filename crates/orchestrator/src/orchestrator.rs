use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EventMetadata, PaymentId, SagaId, UserId};
use domain::{
    Event, EventPayload, FundsDebitedData, FundsInsufficientData, GATEWAY_STATUS_SUCCESS, Money,
    PaymentGatewayResponseData, Saga, SagaState, event,
};
use event_bus::{EventBus, EventHandler, HandlerError, TOPIC_PAYMENTS};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// Creation command for a wallet-funded payment.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWalletPaymentRequest {
    pub user_id: UserId,
    pub service_id: String,
    pub amount: Money,
    pub currency: String,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

/// Creation command for a card-funded payment through the external gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateExternalPaymentRequest {
    pub user_id: UserId,
    pub service_id: String,
    pub amount: Money,
    pub currency: String,
    pub card_token: String,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

/// Acknowledgement returned to the creator of a payment.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub payment_id: PaymentId,
    pub saga_id: SagaId,
    pub status: SagaState,
    pub created_at: DateTime<Utc>,
}

/// Current view of a payment, folded from its event stream.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatus {
    pub payment_id: PaymentId,
    pub saga_id: SagaId,
    pub status: SagaState,
    pub amount: Money,
    pub currency: String,
}

/// The saga orchestrator.
///
/// Emits the initial `*PaymentRequested` events, and consumes the response
/// events produced by the participants (`FundsDebited`, `FundsInsufficient`,
/// `PaymentGatewayResponse`) to emit the terminal outcome events. It never
/// reacts to the request events it publishes itself.
pub struct Orchestrator<S, B> {
    store: S,
    bus: B,
}

impl<S, B> Orchestrator<S, B>
where
    S: EventStore,
    B: EventBus,
{
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    async fn append_and_publish(&self, event: &Event) -> Result<()> {
        self.store.append(event.to_envelope()?).await?;
        // A publish failure after a successful append is surfaced, never
        // retried inline: the event already exists in history, and an
        // inline retry would risk a duplicate publish.
        self.bus.publish(TOPIC_PAYMENTS, event).await?;
        Ok(())
    }

    /// Creates a wallet-funded payment saga.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_wallet_payment(
        &self,
        request: CreateWalletPaymentRequest,
    ) -> Result<PaymentResponse> {
        if !request.amount.is_positive() {
            return Err(OrchestratorError::Validation(
                "amount must be positive".to_string(),
            ));
        }

        let payment_id = PaymentId::new();
        let saga_id = SagaId::new();
        let event = Event::wallet_payment_requested(
            payment_id,
            saga_id,
            request.user_id,
            request.service_id,
            request.amount,
            request.currency,
            request.metadata.unwrap_or_default(),
            EventMetadata::new(),
        );

        self.append_and_publish(&event).await?;

        metrics::counter!("payments_created_total", "type" => "wallet").increment(1);
        tracing::info!(%payment_id, %saga_id, "wallet payment created");

        Ok(PaymentResponse {
            payment_id,
            saga_id,
            status: SagaState::Initialized,
            created_at: event.timestamp,
        })
    }

    /// Creates a card-funded payment saga.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_external_payment(
        &self,
        request: CreateExternalPaymentRequest,
    ) -> Result<PaymentResponse> {
        if !request.amount.is_positive() {
            return Err(OrchestratorError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        if request.card_token.is_empty() {
            return Err(OrchestratorError::Validation(
                "card_token is required".to_string(),
            ));
        }

        let payment_id = PaymentId::new();
        let saga_id = SagaId::new();
        let event = Event::external_payment_requested(
            payment_id,
            saga_id,
            request.user_id,
            request.service_id,
            request.amount,
            request.currency,
            request.card_token,
            request.metadata.unwrap_or_default(),
            EventMetadata::new(),
        );

        self.append_and_publish(&event).await?;

        metrics::counter!("payments_created_total", "type" => "external").increment(1);
        tracing::info!(%payment_id, %saga_id, "external payment created");

        Ok(PaymentResponse {
            payment_id,
            saga_id,
            status: SagaState::Initialized,
            created_at: event.timestamp,
        })
    }

    async fn load_payment_events(&self, payment_id: PaymentId) -> Result<Vec<Event>> {
        let envelopes = self.store.load(&payment_id.into()).await?;
        Ok(event::from_envelopes(envelopes)?)
    }

    /// Rebuilds the saga for a payment and folds in the incoming event
    /// unless the log already contains it (wallet-aggregate events never
    /// do; payment-aggregate events always do, since emission appends
    /// before publishing).
    ///
    /// Returns `None` when the delivery is a no-op: the saga has already
    /// reached a classified outcome, or the event would be an invalid
    /// transition.
    async fn rebuild_saga_with(
        &self,
        payment_id: PaymentId,
        incoming: &Event,
    ) -> Result<Option<(Saga, Vec<Event>)>> {
        let events = self.load_payment_events(payment_id).await?;
        let Some(mut saga) = Saga::fold(&events) else {
            return Err(OrchestratorError::MissingRequestEvent(payment_id));
        };

        if saga.is_terminal() {
            tracing::debug!(%payment_id, state = %saga.state(), "saga already terminal, dropping event");
            return Ok(None);
        }

        if !events.iter().any(|e| e.id == incoming.id)
            && let Err(err) = saga.apply(incoming)
        {
            tracing::warn!(%payment_id, %err, event_type = incoming.event_type(), "dropping unprocessable event");
            return Ok(None);
        }

        Ok(Some((saga, events)))
    }

    /// Pulls the amount and currency from the originating request event.
    fn request_details(events: &[Event]) -> Option<(Money, String)> {
        events.iter().find_map(|event| match &event.payload {
            EventPayload::WalletPaymentRequested(d) => Some((d.amount, d.currency.clone())),
            EventPayload::ExternalPaymentRequested(d) => Some((d.amount, d.currency.clone())),
            _ => None,
        })
    }

    async fn handle_funds_debited(&self, incoming: &Event, data: &FundsDebitedData) -> Result<()> {
        let Some((saga, events)) = self.rebuild_saga_with(data.payment_id, incoming).await? else {
            return Ok(());
        };

        let (amount, currency) =
            Self::request_details(&events).unwrap_or((data.amount, "USD".to_string()));

        let completed = Event::wallet_payment_completed(
            saga.payment_id(),
            saga.saga_id(),
            saga.user_id().clone(),
            amount,
            currency,
            incoming.metadata.clone(),
        );
        self.append_and_publish(&completed).await?;

        metrics::counter!("payments_completed_total", "type" => "wallet").increment(1);
        tracing::info!(payment_id = %saga.payment_id(), "wallet payment completed");
        Ok(())
    }

    async fn handle_funds_insufficient(
        &self,
        incoming: &Event,
        data: &FundsInsufficientData,
    ) -> Result<()> {
        let Some((saga, events)) = self.rebuild_saga_with(data.payment_id, incoming).await? else {
            return Ok(());
        };

        let (amount, currency) =
            Self::request_details(&events).unwrap_or((data.requested_amount, "USD".to_string()));

        let failed = Event::wallet_payment_failed(
            saga.payment_id(),
            saga.saga_id(),
            saga.user_id().clone(),
            amount,
            currency,
            "insufficient_funds",
            incoming.metadata.clone(),
        );
        self.append_and_publish(&failed).await?;

        metrics::counter!("payments_failed_total", "type" => "wallet").increment(1);
        tracing::warn!(payment_id = %saga.payment_id(), "wallet payment failed: insufficient funds");
        Ok(())
    }

    async fn handle_gateway_response(
        &self,
        incoming: &Event,
        data: &PaymentGatewayResponseData,
    ) -> Result<()> {
        let Some((saga, events)) = self.rebuild_saga_with(data.payment_id, incoming).await? else {
            return Ok(());
        };

        let (amount, currency) =
            Self::request_details(&events).unwrap_or((Money::ZERO, "USD".to_string()));

        if data.status == GATEWAY_STATUS_SUCCESS {
            let completed = Event::external_payment_completed(
                saga.payment_id(),
                saga.saga_id(),
                saga.user_id().clone(),
                amount,
                currency,
                data.gateway_provider.clone(),
                data.transaction_id.clone(),
                incoming.metadata.clone(),
            );
            self.append_and_publish(&completed).await?;

            metrics::counter!("payments_completed_total", "type" => "external").increment(1);
            tracing::info!(payment_id = %saga.payment_id(), transaction_id = data.transaction_id, "external payment completed");
        } else {
            let failed = Event::external_payment_failed(
                saga.payment_id(),
                saga.saga_id(),
                saga.user_id().clone(),
                amount,
                currency,
                data.status.clone(),
                data.gateway_provider.clone(),
                incoming.metadata.clone(),
            );
            self.append_and_publish(&failed).await?;

            metrics::counter!("payments_failed_total", "type" => "external").increment(1);
            tracing::warn!(payment_id = %saga.payment_id(), status = data.status, "external payment failed");
        }

        Ok(())
    }

    /// Folds a payment's history into its current status.
    pub async fn get_payment_status(&self, payment_id: PaymentId) -> Result<PaymentStatus> {
        let events = self.load_payment_events(payment_id).await?;
        if events.is_empty() {
            return Err(OrchestratorError::NotFound(payment_id));
        }

        let saga = Saga::fold(&events)
            .ok_or(OrchestratorError::MissingRequestEvent(payment_id))?;
        let (amount, currency) =
            Self::request_details(&events).unwrap_or((Money::ZERO, "USD".to_string()));

        Ok(PaymentStatus {
            payment_id: saga.payment_id(),
            saga_id: saga.saga_id(),
            status: saga.state(),
            amount,
            currency,
        })
    }
}

#[async_trait]
impl<S, B> EventHandler for Orchestrator<S, B>
where
    S: EventStore,
    B: EventBus,
{
    async fn handle(&self, event: Event) -> std::result::Result<(), HandlerError> {
        // Dispatch on response events only; the request events on this
        // topic are the orchestrator's own output.
        let result = match &event.payload {
            EventPayload::FundsDebited(data) => self.handle_funds_debited(&event, data).await,
            EventPayload::FundsInsufficient(data) => {
                self.handle_funds_insufficient(&event, data).await
            }
            EventPayload::PaymentGatewayResponse(data) => {
                self.handle_gateway_response(&event, data).await
            }
            _ => Ok(()),
        };
        result.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::InMemoryEventBus;
    use event_store::InMemoryEventStore;

    struct Harness {
        orchestrator: Orchestrator<InMemoryEventStore, InMemoryEventBus>,
        store: InMemoryEventStore,
    }

    fn harness() -> Harness {
        let store = InMemoryEventStore::new();
        let bus = InMemoryEventBus::new(4);
        Harness {
            orchestrator: Orchestrator::new(store.clone(), bus),
            store,
        }
    }

    fn wallet_request(amount: i64) -> CreateWalletPaymentRequest {
        CreateWalletPaymentRequest {
            user_id: UserId::new("user_123"),
            service_id: "svc_1".to_string(),
            amount: Money::from_cents(amount),
            currency: "USD".to_string(),
            metadata: None,
        }
    }

    fn external_request(amount: i64, card_token: &str) -> CreateExternalPaymentRequest {
        CreateExternalPaymentRequest {
            user_id: UserId::new("user_123"),
            service_id: "svc_1".to_string(),
            amount: Money::from_cents(amount),
            currency: "USD".to_string(),
            card_token: card_token.to_string(),
            metadata: None,
        }
    }

    async fn payment_stream(store: &InMemoryEventStore, payment_id: PaymentId) -> Vec<String> {
        store
            .load(&payment_id.into())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    #[tokio::test]
    async fn creation_appends_and_reports_initialized() {
        let h = harness();

        let response = h
            .orchestrator
            .create_wallet_payment(wallet_request(1500))
            .await
            .unwrap();

        assert_eq!(response.status, SagaState::Initialized);
        assert_eq!(
            payment_stream(&h.store, response.payment_id).await,
            vec!["WalletPaymentRequested"]
        );

        let status = h
            .orchestrator
            .get_payment_status(response.payment_id)
            .await
            .unwrap();
        assert_eq!(status.status, SagaState::ValidatingBalance);
        assert_eq!(status.amount, Money::from_cents(1500));
        assert_eq!(status.saga_id, response.saga_id);
    }

    #[tokio::test]
    async fn creation_rejects_non_positive_amounts() {
        let h = harness();
        let err = h
            .orchestrator
            .create_wallet_payment(wallet_request(0))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));

        let err = h
            .orchestrator
            .create_external_payment(external_request(-5, "tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
    }

    #[tokio::test]
    async fn external_creation_requires_a_card_token() {
        let h = harness();
        let err = h
            .orchestrator
            .create_external_payment(external_request(2000, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
    }

    #[tokio::test]
    async fn funds_debited_completes_the_wallet_saga() {
        let h = harness();
        let response = h
            .orchestrator
            .create_wallet_payment(wallet_request(1500))
            .await
            .unwrap();

        let debit = Event::funds_debited(
            response.payment_id,
            UserId::new("user_123"),
            Money::from_cents(1500),
            Money::from_cents(5000),
            Money::from_cents(3500),
            EventMetadata::new(),
        );
        h.orchestrator.handle(debit).await.unwrap();

        assert_eq!(
            payment_stream(&h.store, response.payment_id).await,
            vec!["WalletPaymentRequested", "WalletPaymentCompleted"]
        );
        let status = h
            .orchestrator
            .get_payment_status(response.payment_id)
            .await
            .unwrap();
        assert_eq!(status.status, SagaState::Completed);
    }

    #[tokio::test]
    async fn funds_insufficient_fails_the_wallet_saga() {
        let h = harness();
        let response = h
            .orchestrator
            .create_wallet_payment(wallet_request(1000))
            .await
            .unwrap();

        let insufficient = Event::funds_insufficient(
            response.payment_id,
            UserId::new("user_123"),
            Money::from_cents(1000),
            Money::from_cents(500),
            EventMetadata::new(),
        );
        h.orchestrator.handle(insufficient).await.unwrap();

        let events = h
            .store
            .load(&response.payment_id.into())
            .await
            .unwrap();
        let failed = events
            .iter()
            .find(|e| e.event_type == "WalletPaymentFailed")
            .expect("failure event emitted");
        assert_eq!(failed.payload["reason"], "insufficient_funds");
        assert_eq!(failed.payload["amount"], 1000);

        let status = h
            .orchestrator
            .get_payment_status(response.payment_id)
            .await
            .unwrap();
        assert_eq!(status.status, SagaState::Failed);
    }

    #[tokio::test]
    async fn successful_gateway_response_completes_the_external_saga() {
        let h = harness();
        let response = h
            .orchestrator
            .create_external_payment(external_request(2000, "tok_1"))
            .await
            .unwrap();

        // The external payment service would have recorded these.
        let sent = Event::payment_sent_to_gateway(
            response.payment_id,
            response.saga_id,
            "external",
            "gw_1",
            EventMetadata::new(),
        );
        h.store.append(sent.to_envelope().unwrap()).await.unwrap();
        let gateway_response = Event::payment_gateway_response(
            response.payment_id,
            response.saga_id,
            "external",
            "SUCCESS",
            "txn_42",
            EventMetadata::new(),
        );
        h.store
            .append(gateway_response.to_envelope().unwrap())
            .await
            .unwrap();

        h.orchestrator.handle(gateway_response).await.unwrap();

        let types = payment_stream(&h.store, response.payment_id).await;
        assert_eq!(
            types,
            vec![
                "ExternalPaymentRequested",
                "PaymentSentToGateway",
                "PaymentGatewayResponse",
                "ExternalPaymentCompleted",
            ]
        );
        let status = h
            .orchestrator
            .get_payment_status(response.payment_id)
            .await
            .unwrap();
        assert_eq!(status.status, SagaState::Completed);
    }

    #[tokio::test]
    async fn rejected_gateway_response_fails_the_external_saga() {
        let h = harness();
        let response = h
            .orchestrator
            .create_external_payment(external_request(2000, "tok_1"))
            .await
            .unwrap();

        let sent = Event::payment_sent_to_gateway(
            response.payment_id,
            response.saga_id,
            "external",
            "gw_1",
            EventMetadata::new(),
        );
        h.store.append(sent.to_envelope().unwrap()).await.unwrap();
        let gateway_response = Event::payment_gateway_response(
            response.payment_id,
            response.saga_id,
            "external",
            "DECLINED",
            "txn_43",
            EventMetadata::new(),
        );
        h.store
            .append(gateway_response.to_envelope().unwrap())
            .await
            .unwrap();

        h.orchestrator.handle(gateway_response).await.unwrap();

        let events = h.store.load(&response.payment_id.into()).await.unwrap();
        let failed = events
            .iter()
            .find(|e| e.event_type == "ExternalPaymentFailed")
            .expect("failure event emitted");
        assert_eq!(failed.payload["reason"], "DECLINED");

        let status = h
            .orchestrator
            .get_payment_status(response.payment_id)
            .await
            .unwrap();
        assert_eq!(status.status, SagaState::Failed);
    }

    #[tokio::test]
    async fn redelivered_response_event_is_a_no_op() {
        let h = harness();
        let response = h
            .orchestrator
            .create_wallet_payment(wallet_request(1500))
            .await
            .unwrap();

        let debit = Event::funds_debited(
            response.payment_id,
            UserId::new("user_123"),
            Money::from_cents(1500),
            Money::from_cents(5000),
            Money::from_cents(3500),
            EventMetadata::new(),
        );
        h.orchestrator.handle(debit.clone()).await.unwrap();
        h.orchestrator.handle(debit).await.unwrap();

        let types = payment_stream(&h.store, response.payment_id).await;
        assert_eq!(
            types,
            vec!["WalletPaymentRequested", "WalletPaymentCompleted"]
        );
    }

    #[tokio::test]
    async fn request_events_are_ignored_by_the_response_loop() {
        let h = harness();
        let response = h
            .orchestrator
            .create_wallet_payment(wallet_request(1500))
            .await
            .unwrap();

        let request_events = h.store.load(&response.payment_id.into()).await.unwrap();
        let request = Event::from_envelope(request_events[0].clone()).unwrap();
        h.orchestrator.handle(request).await.unwrap();

        assert_eq!(
            payment_stream(&h.store, response.payment_id).await,
            vec!["WalletPaymentRequested"]
        );
    }

    #[tokio::test]
    async fn status_of_unknown_payment_is_not_found() {
        let h = harness();
        let err = h
            .orchestrator
            .get_payment_status(PaymentId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }
}
