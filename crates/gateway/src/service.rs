use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::EventMetadata;
use dlq::DeadLetterSink;
use domain::{Event, EventPayload, ExternalPaymentRequestedData, event};
use event_bus::{EventBus, EventHandler, GROUP_EXTERNAL_PAYMENT, HandlerError, TOPIC_PAYMENTS};
use event_store::EventStore;

use crate::error::Result;
use crate::gateway::{GatewayError, GatewayRequest, PaymentGateway};
use crate::retry::RetryPolicy;

const GATEWAY_PROVIDER: &str = "external";
const MAX_RETRIES_REASON: &str = "MAX_RETRIES_EXCEEDED";

/// The external payment participant.
///
/// Consumes `ExternalPaymentRequested`, drives the gateway with a bounded
/// retry loop, and records every step in the log: sent/response on success,
/// timeout/retry bookkeeping along the way, a terminal failure plus a
/// dead-letter record on exhaustion.
pub struct ExternalPaymentService<S, B, G, D> {
    store: S,
    bus: B,
    gateway: G,
    dead_letter: D,
    retry_policy: RetryPolicy,
    attempt_timeout: Duration,
    webhook_delay: Duration,
}

impl<S, B, G, D> ExternalPaymentService<S, B, G, D>
where
    S: EventStore + Clone + Send + Sync + 'static,
    B: EventBus + Clone + 'static,
    G: PaymentGateway,
    D: DeadLetterSink,
{
    pub fn new(store: S, bus: B, gateway: G, dead_letter: D) -> Self {
        Self {
            store,
            bus,
            gateway,
            dead_letter,
            retry_policy: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(30),
            webhook_delay: Duration::from_millis(200),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_webhook_delay(mut self, delay: Duration) -> Self {
        self.webhook_delay = delay;
        self
    }

    async fn append_and_publish(&self, event: &Event) -> Result<()> {
        self.store.append(event.to_envelope()?).await?;
        self.bus.publish(TOPIC_PAYMENTS, event).await?;
        Ok(())
    }

    /// Bookkeeping events must not abort the retry loop when persistence
    /// hiccups; they are logged and forgotten.
    async fn append_and_publish_best_effort(&self, event: &Event) {
        if let Err(err) = self.append_and_publish(event).await {
            tracing::error!(
                event_type = event.event_type(),
                %err,
                "failed to record bookkeeping event"
            );
        }
    }

    /// Returns true if this request was already driven to the gateway or to
    /// a terminal failure, which makes a redelivery a no-op.
    async fn already_processed(&self, data: &ExternalPaymentRequestedData) -> Result<bool> {
        let envelopes = self.store.load(&data.payment_id.into()).await?;
        let events = event::from_envelopes(envelopes)?;
        Ok(events.iter().any(|e| {
            matches!(
                e.payload,
                EventPayload::PaymentSentToGateway(_) | EventPayload::ExternalPaymentFailed(_)
            )
        }))
    }

    #[tracing::instrument(skip(self, data, metadata), fields(payment_id = %data.payment_id, saga_id = %data.saga_id))]
    async fn process_with_retry(
        &self,
        data: &ExternalPaymentRequestedData,
        metadata: EventMetadata,
    ) -> Result<()> {
        let request = GatewayRequest {
            payment_id: data.payment_id,
            amount: data.amount,
            currency: data.currency.clone(),
            card_token: data.card_token.clone(),
        };

        let mut attempt = 0;
        let mut delay = self.retry_policy.initial_delay;

        while attempt < self.retry_policy.max_attempts {
            attempt += 1;

            let outcome = tokio::time::timeout(
                self.attempt_timeout,
                self.gateway.process_payment(request.clone()),
            )
            .await;

            let error_text = match outcome {
                Ok(Ok(response)) => {
                    return self.handle_success(data, response, metadata).await;
                }
                Ok(Err(err @ GatewayError::Rejected(_)))
                | Ok(Err(err @ GatewayError::Unavailable(_))) => {
                    return self
                        .handle_permanent_failure(data, &err.to_string(), metadata)
                        .await;
                }
                Err(_elapsed) => {
                    let reason = format!(
                        "gateway call timed out after {}s",
                        self.attempt_timeout.as_secs()
                    );
                    let timeout_event = Event::payment_gateway_timeout(
                        data.payment_id,
                        data.saga_id,
                        GATEWAY_PROVIDER,
                        attempt,
                        self.retry_policy.max_attempts,
                        self.attempt_timeout.as_secs(),
                        metadata.clone(),
                    );
                    self.append_and_publish_best_effort(&timeout_event).await;

                    metrics::counter!("gateway_timeouts_total").increment(1);
                    tracing::warn!(attempt, "gateway timeout");
                    reason
                }
            };

            if attempt < self.retry_policy.max_attempts {
                let retry_event = Event::payment_retry_requested(
                    data.payment_id,
                    data.saga_id,
                    attempt + 1,
                    error_text,
                    Utc::now() + delay,
                    metadata.clone(),
                );
                self.append_and_publish_best_effort(&retry_event).await;

                tracing::info!(next_attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "retry scheduled");
                tokio::time::sleep(delay).await;
                delay = self.retry_policy.next_delay(delay);
            }
        }

        self.handle_exhaustion(data, metadata).await
    }

    async fn handle_success(
        &self,
        data: &ExternalPaymentRequestedData,
        response: crate::gateway::GatewayResponse,
        metadata: EventMetadata,
    ) -> Result<()> {
        let sent = Event::payment_sent_to_gateway(
            data.payment_id,
            data.saga_id,
            GATEWAY_PROVIDER,
            response.gateway_payment_id.clone(),
            metadata.clone(),
        );
        self.append_and_publish(&sent).await?;

        metrics::counter!("gateway_payments_sent_total").increment(1);
        tracing::info!(gateway_payment_id = response.gateway_payment_id, "payment sent to gateway");

        self.spawn_webhook_response(data.clone(), response, metadata);
        Ok(())
    }

    /// The gateway confirms asynchronously in production; here the
    /// confirmation is simulated by a background task that records the
    /// response after a short delay.
    fn spawn_webhook_response(
        &self,
        data: ExternalPaymentRequestedData,
        response: crate::gateway::GatewayResponse,
        metadata: EventMetadata,
    ) {
        let store = self.store.clone();
        let bus = self.bus.clone();
        let delay = self.webhook_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let event = Event::payment_gateway_response(
                data.payment_id,
                data.saga_id,
                GATEWAY_PROVIDER,
                response.status.clone(),
                response.transaction_id,
                metadata,
            );

            let envelope = match event.to_envelope() {
                Ok(envelope) => envelope,
                Err(err) => {
                    tracing::error!(%err, "failed to encode gateway response event");
                    return;
                }
            };
            if let Err(err) = store.append(envelope).await {
                tracing::error!(payment_id = %data.payment_id, %err, "failed to save gateway response event");
                return;
            }
            if let Err(err) = bus.publish(TOPIC_PAYMENTS, &event).await {
                tracing::error!(payment_id = %data.payment_id, %err, "failed to publish gateway response event");
                return;
            }

            tracing::info!(payment_id = %data.payment_id, status = response.status, "webhook response recorded");
        });
    }

    async fn handle_permanent_failure(
        &self,
        data: &ExternalPaymentRequestedData,
        reason: &str,
        metadata: EventMetadata,
    ) -> Result<()> {
        let failed = Event::external_payment_failed(
            data.payment_id,
            data.saga_id,
            data.user_id.clone(),
            data.amount,
            data.currency.clone(),
            reason,
            GATEWAY_PROVIDER,
            metadata,
        );
        self.append_and_publish(&failed).await?;

        metrics::counter!("gateway_payments_rejected_total").increment(1);
        tracing::error!(reason, "payment failed permanently");
        Ok(())
    }

    async fn handle_exhaustion(
        &self,
        data: &ExternalPaymentRequestedData,
        metadata: EventMetadata,
    ) -> Result<()> {
        let failed = Event::external_payment_failed(
            data.payment_id,
            data.saga_id,
            data.user_id.clone(),
            data.amount,
            data.currency.clone(),
            MAX_RETRIES_REASON,
            GATEWAY_PROVIDER,
            metadata,
        );
        self.append_and_publish(&failed).await?;

        metrics::counter!("gateway_payments_exhausted_total").increment(1);
        tracing::error!(
            max_attempts = self.retry_policy.max_attempts,
            "payment failed after max retries"
        );

        if let Err(err) = self
            .dead_letter
            .publish(
                failed,
                MAX_RETRIES_REASON,
                GROUP_EXTERNAL_PAYMENT,
                TOPIC_PAYMENTS,
                0,
                0,
            )
            .await
        {
            tracing::error!(payment_id = %data.payment_id, %err, "failed to dead-letter payment");
        }

        Ok(())
    }
}

#[async_trait]
impl<S, B, G, D> EventHandler for ExternalPaymentService<S, B, G, D>
where
    S: EventStore + Clone + Send + Sync + 'static,
    B: EventBus + Clone + 'static,
    G: PaymentGateway,
    D: DeadLetterSink,
{
    async fn handle(&self, event: Event) -> std::result::Result<(), HandlerError> {
        match &event.payload {
            EventPayload::ExternalPaymentRequested(data) => {
                if self.already_processed(data).await? {
                    tracing::debug!(payment_id = %data.payment_id, "duplicate delivery, payment already driven");
                    return Ok(());
                }
                self.process_with_retry(data, event.metadata.clone())
                    .await
                    .map_err(Into::into)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MockOutcome, MockPaymentGateway};
    use common::{PaymentId, SagaId, UserId};
    use dlq::{DeadLetterQueue, ErrorType};
    use domain::Money;
    use event_bus::InMemoryEventBus;
    use event_store::InMemoryEventStore;
    use std::collections::HashMap;

    type TestService =
        ExternalPaymentService<InMemoryEventStore, InMemoryEventBus, MockPaymentGateway, DeadLetterQueue>;

    struct Harness {
        service: TestService,
        store: InMemoryEventStore,
        gateway: MockPaymentGateway,
        sink: DeadLetterQueue,
    }

    fn harness(max_attempts: u32) -> Harness {
        let store = InMemoryEventStore::new();
        let bus = InMemoryEventBus::new(4);
        let gateway = MockPaymentGateway::new();
        gateway.set_latency(Duration::from_millis(1));
        let sink = DeadLetterQueue::new(100);

        let service = ExternalPaymentService::new(
            store.clone(),
            bus,
            gateway.clone(),
            sink.clone(),
        )
        .with_retry_policy(RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            multiplier: 2.0,
            jitter: false,
        })
        .with_attempt_timeout(Duration::from_millis(50))
        .with_webhook_delay(Duration::from_millis(20));

        Harness {
            service,
            store,
            gateway,
            sink,
        }
    }

    fn request_event() -> Event {
        Event::external_payment_requested(
            PaymentId::new(),
            SagaId::new(),
            UserId::new("user_1"),
            "svc_1",
            Money::from_cents(2000),
            "USD",
            "tok_1",
            HashMap::new(),
            EventMetadata::new(),
        )
    }

    async fn stream_types(store: &InMemoryEventStore, event: &Event) -> Vec<String> {
        store
            .load(&event.aggregate_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    async fn eventually(mut check: impl AsyncFnMut() -> bool) {
        for _ in 0..300 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 3s");
    }

    #[tokio::test]
    async fn success_records_sent_then_webhook_response() {
        let h = harness(3);
        let request = request_event();
        h.store.append(request.to_envelope().unwrap()).await.unwrap();

        h.service.handle(request.clone()).await.unwrap();

        let types = stream_types(&h.store, &request).await;
        assert_eq!(
            &types[..2],
            ["ExternalPaymentRequested", "PaymentSentToGateway"]
        );

        eventually(async || {
            stream_types(&h.store, &request)
                .await
                .contains(&"PaymentGatewayResponse".to_string())
        })
        .await;
        assert_eq!(h.gateway.call_count(), 1);
        assert!(h.sink.records().is_empty());
    }

    #[tokio::test]
    async fn timeout_then_success_records_retry_bookkeeping() {
        let h = harness(3);
        h.gateway.script([MockOutcome::Timeout]);
        let request = request_event();
        h.store.append(request.to_envelope().unwrap()).await.unwrap();

        h.service.handle(request.clone()).await.unwrap();

        let types = stream_types(&h.store, &request).await;
        assert_eq!(
            types,
            vec![
                "ExternalPaymentRequested",
                "PaymentGatewayTimeout",
                "PaymentRetryRequested",
                "PaymentSentToGateway",
            ]
        );
        assert_eq!(h.gateway.call_count(), 2);
        assert!(h.sink.records().is_empty());
    }

    #[tokio::test]
    async fn exhaustion_fails_and_dead_letters() {
        let h = harness(3);
        h.gateway
            .script([MockOutcome::Timeout, MockOutcome::Timeout, MockOutcome::Timeout]);
        let request = request_event();
        h.store.append(request.to_envelope().unwrap()).await.unwrap();

        h.service.handle(request.clone()).await.unwrap();

        let types = stream_types(&h.store, &request).await;
        assert_eq!(
            types,
            vec![
                "ExternalPaymentRequested",
                "PaymentGatewayTimeout",
                "PaymentRetryRequested",
                "PaymentGatewayTimeout",
                "PaymentRetryRequested",
                "PaymentGatewayTimeout",
                "ExternalPaymentFailed",
            ]
        );

        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error_type, ErrorType::TimeoutMaxRetries);
        assert_eq!(records[0].consumer_group, "external-payment-service");
    }

    #[tokio::test]
    async fn rejection_is_a_permanent_failure_without_dead_letter() {
        let h = harness(3);
        h.gateway
            .script([MockOutcome::Reject("card_declined".to_string())]);
        let request = request_event();
        h.store.append(request.to_envelope().unwrap()).await.unwrap();

        h.service.handle(request.clone()).await.unwrap();

        let types = stream_types(&h.store, &request).await;
        assert_eq!(
            types,
            vec!["ExternalPaymentRequested", "ExternalPaymentFailed"]
        );
        assert_eq!(h.gateway.call_count(), 1);
        assert!(h.sink.records().is_empty());
    }

    #[tokio::test]
    async fn redelivered_request_does_not_recharge_the_gateway() {
        let h = harness(3);
        let request = request_event();
        h.store.append(request.to_envelope().unwrap()).await.unwrap();

        h.service.handle(request.clone()).await.unwrap();
        let calls_after_first = h.gateway.call_count();
        h.service.handle(request.clone()).await.unwrap();

        assert_eq!(h.gateway.call_count(), calls_after_first);
    }
}
