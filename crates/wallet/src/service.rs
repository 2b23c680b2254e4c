use async_trait::async_trait;
use common::{EventMetadata, PaymentId, UserId};
use domain::{DomainError, Event, EventPayload, Money, Wallet, WalletPaymentRequestedData, event};
use event_bus::{EventBus, EventHandler, HandlerError, TOPIC_PAYMENTS};
use event_store::EventStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// A refund to be credited back to a wallet.
#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    pub payment_id: PaymentId,
    pub user_id: UserId,
    pub amount: Money,
    pub reason: String,
}

/// Outcome of a processed refund.
#[derive(Debug, Clone, Serialize)]
pub struct RefundReceipt {
    pub refund_id: Uuid,
    pub payment_id: PaymentId,
    pub user_id: UserId,
    pub amount: Money,
    pub new_balance: Money,
}

/// The wallet participant.
///
/// Consumes `WalletPaymentRequested` from the bus, rebuilds the user's
/// wallet from the log, and answers with either `FundsDebited` or
/// `FundsInsufficient`. Also processes refunds arriving over the internal
/// HTTP surface.
pub struct WalletService<S, B> {
    store: S,
    bus: B,
}

impl<S, B> WalletService<S, B>
where
    S: EventStore,
    B: EventBus,
{
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    /// Rebuilds a user's wallet together with the raw event stream it was
    /// folded from.
    async fn rebuild_wallet(&self, user_id: &UserId) -> Result<(Wallet, Vec<Event>)> {
        let envelopes = self.store.load(&user_id.into()).await?;
        let events = event::from_envelopes(envelopes)?;
        let wallet = Wallet::fold(user_id.clone(), &events);
        Ok((wallet, events))
    }

    /// Returns the current wallet state for a user.
    pub async fn wallet_balance(&self, user_id: &UserId) -> Result<Wallet> {
        let (wallet, _) = self.rebuild_wallet(user_id).await?;
        Ok(wallet)
    }

    async fn append_and_publish(&self, event: &Event) -> Result<()> {
        self.store.append(event.to_envelope()?).await?;
        self.bus.publish(TOPIC_PAYMENTS, event).await?;
        Ok(())
    }

    /// Returns true if the wallet stream already answered this payment.
    /// Delivery is at-least-once, so a redelivered request must not debit
    /// twice.
    fn already_processed(events: &[Event], payment_id: PaymentId) -> bool {
        events.iter().any(|event| match &event.payload {
            EventPayload::FundsDebited(d) => d.payment_id == payment_id,
            EventPayload::FundsInsufficient(d) => d.payment_id == payment_id,
            _ => false,
        })
    }

    #[tracing::instrument(skip(self, data), fields(payment_id = %data.payment_id, user_id = %data.user_id))]
    async fn handle_payment_requested(&self, data: &WalletPaymentRequestedData, metadata: EventMetadata) -> Result<()> {
        let (wallet, events) = self.rebuild_wallet(&data.user_id).await?;

        if Self::already_processed(&events, data.payment_id) {
            tracing::debug!("duplicate delivery, payment already answered");
            return Ok(());
        }

        match wallet.validate_debit(data.amount) {
            Ok(()) => {}
            Err(DomainError::InsufficientFunds { .. }) | Err(DomainError::NonPositiveAmount(_)) => {
                // Business outcome: answer with FundsInsufficient and let
                // the offset commit.
                let insufficient = Event::funds_insufficient(
                    data.payment_id,
                    data.user_id.clone(),
                    data.amount,
                    wallet.available_balance(),
                    metadata,
                );
                self.append_and_publish(&insufficient).await?;

                metrics::counter!("wallet_insufficient_funds_total").increment(1);
                tracing::warn!(
                    requested = %data.amount,
                    available = %wallet.available_balance(),
                    "insufficient funds"
                );
                return Ok(());
            }
            Err(other) => return Err(other.into()),
        }

        let previous_balance = wallet.balance();
        let new_balance = previous_balance - data.amount;

        let debit = Event::funds_debited(
            data.payment_id,
            data.user_id.clone(),
            data.amount,
            previous_balance,
            new_balance,
            metadata,
        );
        self.append_and_publish(&debit).await?;

        metrics::counter!("wallet_debits_total").increment(1);
        tracing::info!(amount = %data.amount, new_balance = %new_balance, "funds debited");
        Ok(())
    }

    /// Credits a refund back to the user's wallet.
    #[tracing::instrument(skip(self, request), fields(payment_id = %request.payment_id, user_id = %request.user_id))]
    pub async fn process_refund(&self, request: RefundRequest) -> Result<RefundReceipt> {
        if !request.amount.is_positive() {
            return Err(DomainError::NonPositiveAmount(request.amount).into());
        }

        let (wallet, _) = self.rebuild_wallet(&request.user_id).await?;
        let previous_balance = wallet.balance();
        let new_balance = previous_balance + request.amount;
        let refund_id = Uuid::new_v4();

        let credit = Event::funds_credited(
            refund_id,
            request.payment_id,
            request.user_id.clone(),
            request.amount,
            previous_balance,
            new_balance,
            request.reason,
            EventMetadata::new(),
        );
        self.append_and_publish(&credit).await?;

        metrics::counter!("wallet_refunds_total").increment(1);
        tracing::info!(%refund_id, amount = %request.amount, "funds credited");

        Ok(RefundReceipt {
            refund_id,
            payment_id: request.payment_id,
            user_id: request.user_id,
            amount: request.amount,
            new_balance,
        })
    }
}

#[async_trait]
impl<S, B> EventHandler for WalletService<S, B>
where
    S: EventStore,
    B: EventBus,
{
    async fn handle(&self, event: Event) -> std::result::Result<(), HandlerError> {
        match &event.payload {
            EventPayload::WalletPaymentRequested(data) => {
                self.handle_payment_requested(data, event.metadata.clone())
                    .await
                    .map_err(Into::into)
            }
            // The wallet only reacts to payment requests; everything else
            // on the topic belongs to other consumers.
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SagaId;
    use event_bus::InMemoryEventBus;
    use event_store::InMemoryEventStore;
    use std::collections::HashMap;

    fn service() -> (
        WalletService<InMemoryEventStore, InMemoryEventBus>,
        InMemoryEventStore,
    ) {
        let store = InMemoryEventStore::new();
        let bus = InMemoryEventBus::new(4);
        (WalletService::new(store.clone(), bus), store)
    }

    async fn seed(store: &InMemoryEventStore, user: &str, amount: i64) {
        let credit = Event::funds_credited(
            Uuid::new_v4(),
            PaymentId::new(),
            UserId::new(user),
            Money::from_cents(amount),
            Money::ZERO,
            Money::from_cents(amount),
            "seed",
            EventMetadata::new(),
        );
        store.append(credit.to_envelope().unwrap()).await.unwrap();
    }

    fn request(user: &str, amount: i64) -> Event {
        Event::wallet_payment_requested(
            PaymentId::new(),
            SagaId::new(),
            UserId::new(user),
            "svc_1",
            Money::from_cents(amount),
            "USD",
            HashMap::new(),
            EventMetadata::new(),
        )
    }

    async fn stream_types(store: &InMemoryEventStore, user: &str) -> Vec<String> {
        store
            .load(&UserId::new(user).into())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    #[tokio::test]
    async fn sufficient_funds_produce_a_debit() {
        let (service, store) = service();
        seed(&store, "user_123", 5000).await;

        service.handle(request("user_123", 1500)).await.unwrap();

        assert_eq!(
            stream_types(&store, "user_123").await,
            vec!["FundsCredited", "FundsDebited"]
        );
        let wallet = service
            .wallet_balance(&UserId::new("user_123"))
            .await
            .unwrap();
        assert_eq!(wallet.balance(), Money::from_cents(3500));
    }

    #[tokio::test]
    async fn insufficient_funds_is_an_outcome_not_an_error() {
        let (service, store) = service();
        seed(&store, "user_456", 500).await;

        // The handler must return Ok so the broker commits the offset.
        service.handle(request("user_456", 1000)).await.unwrap();

        assert_eq!(
            stream_types(&store, "user_456").await,
            vec!["FundsCredited", "FundsInsufficient"]
        );
        let wallet = service
            .wallet_balance(&UserId::new("user_456"))
            .await
            .unwrap();
        assert_eq!(wallet.balance(), Money::from_cents(500));
    }

    #[tokio::test]
    async fn redelivered_request_debits_only_once() {
        let (service, store) = service();
        seed(&store, "user_123", 5000).await;

        let event = request("user_123", 1500);
        service.handle(event.clone()).await.unwrap();
        service.handle(event).await.unwrap();

        assert_eq!(
            stream_types(&store, "user_123").await,
            vec!["FundsCredited", "FundsDebited"]
        );
    }

    #[tokio::test]
    async fn refund_credits_the_wallet() {
        let (service, store) = service();
        seed(&store, "user_123", 1000).await;

        let receipt = service
            .process_refund(RefundRequest {
                payment_id: PaymentId::new(),
                user_id: UserId::new("user_123"),
                amount: Money::from_cents(250),
                reason: "gateway refund".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(receipt.new_balance, Money::from_cents(1250));
        assert_eq!(
            stream_types(&store, "user_123").await,
            vec!["FundsCredited", "FundsCredited"]
        );
    }

    #[tokio::test]
    async fn refund_rejects_non_positive_amounts() {
        let (service, _) = service();

        let err = service
            .process_refund(RefundRequest {
                payment_id: PaymentId::new(),
                user_id: UserId::new("user_123"),
                amount: Money::ZERO,
                reason: "bogus".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            crate::WalletError::Domain(DomainError::NonPositiveAmount(_))
        ));
    }

    #[tokio::test]
    async fn unrelated_events_are_ignored() {
        let (service, store) = service();
        let event = Event::payment_sent_to_gateway(
            PaymentId::new(),
            SagaId::new(),
            "external",
            "gw_1",
            EventMetadata::new(),
        );

        service.handle(event).await.unwrap();
        assert_eq!(store.event_count().await, 0);
    }
}
