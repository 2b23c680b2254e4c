//! The event-sourced saga aggregate.

use chrono::{DateTime, Utc};
use common::{PaymentId, SagaId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::event::{Event, EventPayload};
use crate::state::SagaState;

/// Which funding path a payment takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Wallet,
    External,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Wallet => "wallet",
            PaymentKind::External => "external",
        }
    }
}

impl std::fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A payment saga, rebuilt by folding the payment's event stream.
///
/// The saga never persists its own state; it exists only for the duration of
/// one handler invocation. Timestamps derive from event timestamps so that
/// re-folding the same stream always yields the same saga.
#[derive(Debug, Clone)]
pub struct Saga {
    saga_id: SagaId,
    payment_id: PaymentId,
    user_id: UserId,
    payment_kind: PaymentKind,
    state: SagaState,
    version: u64,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl Saga {
    pub fn new(
        saga_id: SagaId,
        payment_id: PaymentId,
        user_id: UserId,
        payment_kind: PaymentKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            saga_id,
            payment_id,
            user_id,
            payment_kind,
            state: SagaState::Initialized,
            version: 0,
            created_at,
            last_activity: created_at,
        }
    }

    pub fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    pub fn payment_id(&self) -> PaymentId {
        self.payment_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn payment_kind(&self) -> PaymentKind {
        self.payment_kind
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Applies one event to the saga.
    ///
    /// Only classified outcomes and the request/gateway milestones move the
    /// state; retries, timeouts and unknown events are no-ops. Transitions
    /// not in the state machine fail with `InvalidTransition`.
    pub fn apply(&mut self, event: &Event) -> Result<()> {
        let target = match &event.payload {
            EventPayload::WalletPaymentRequested(_) => SagaState::ValidatingBalance,
            EventPayload::ExternalPaymentRequested(_) => SagaState::SendingToGateway,
            EventPayload::FundsDebited(_) => SagaState::Completed,
            EventPayload::FundsInsufficient(_) => SagaState::Failed,
            EventPayload::PaymentSentToGateway(_) => SagaState::SentToGateway,
            EventPayload::PaymentGatewayResponse(_) => SagaState::AwaitingResponse,
            EventPayload::WalletPaymentCompleted(_) | EventPayload::ExternalPaymentCompleted(_) => {
                SagaState::Completed
            }
            EventPayload::WalletPaymentFailed(_) | EventPayload::ExternalPaymentFailed(_) => {
                SagaState::Failed
            }
            // Retry bookkeeping and unrecognized events do not move the saga.
            _ => return Ok(()),
        };

        self.transition_to(target, event.timestamp)
    }

    fn transition_to(&mut self, target: SagaState, at: DateTime<Utc>) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(DomainError::InvalidTransition {
                from: self.state,
                to: target,
            });
        }

        self.state = target;
        self.version += 1;
        self.last_activity = at;
        Ok(())
    }

    /// Rebuilds a saga from a payment's event stream.
    ///
    /// The identity (saga id, user id, funding kind) comes from the first
    /// `*PaymentRequested` event; `None` if the stream contains no request
    /// event. Events that would be invalid transitions (duplicates delivered
    /// after a classified outcome) are skipped with a warning, so a fold
    /// never visits a state after a terminal state.
    pub fn fold(events: &[Event]) -> Option<Saga> {
        let mut saga = events.iter().find_map(|event| match &event.payload {
            EventPayload::WalletPaymentRequested(data) => Some(Saga::new(
                data.saga_id,
                data.payment_id,
                data.user_id.clone(),
                PaymentKind::Wallet,
                event.timestamp,
            )),
            EventPayload::ExternalPaymentRequested(data) => Some(Saga::new(
                data.saga_id,
                data.payment_id,
                data.user_id.clone(),
                PaymentKind::External,
                event.timestamp,
            )),
            _ => None,
        })?;

        for event in events {
            if let Err(err) = saga.apply(event) {
                tracing::warn!(
                    event_type = event.event_type(),
                    %err,
                    "skipping event during saga fold"
                );
            }
        }

        Some(saga)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use common::EventMetadata;
    use std::collections::HashMap;

    fn wallet_request(payment_id: PaymentId, saga_id: SagaId) -> Event {
        Event::wallet_payment_requested(
            payment_id,
            saga_id,
            UserId::new("user_123"),
            "svc_1",
            Money::from_cents(1500),
            "USD",
            HashMap::new(),
            EventMetadata::new(),
        )
    }

    fn external_request(payment_id: PaymentId, saga_id: SagaId) -> Event {
        Event::external_payment_requested(
            payment_id,
            saga_id,
            UserId::new("user_123"),
            "svc_1",
            Money::from_cents(2000),
            "USD",
            "tok_1",
            HashMap::new(),
            EventMetadata::new(),
        )
    }

    #[test]
    fn wallet_happy_path_reaches_completed() {
        let payment_id = PaymentId::new();
        let saga_id = SagaId::new();
        let events = vec![
            wallet_request(payment_id, saga_id),
            Event::funds_debited(
                payment_id,
                UserId::new("user_123"),
                Money::from_cents(1500),
                Money::from_cents(5000),
                Money::from_cents(3500),
                EventMetadata::new(),
            ),
        ];

        let mut saga = Saga::fold(&events[..1]).unwrap();
        assert_eq!(saga.state(), SagaState::ValidatingBalance);
        assert_eq!(saga.saga_id(), saga_id);
        assert_eq!(saga.payment_kind(), PaymentKind::Wallet);

        saga.apply(&events[1]).unwrap();
        assert_eq!(saga.state(), SagaState::Completed);
        assert!(saga.is_terminal());
    }

    #[test]
    fn insufficient_funds_fails_the_saga() {
        let payment_id = PaymentId::new();
        let mut saga = Saga::fold(&[wallet_request(payment_id, SagaId::new())]).unwrap();

        let insufficient = Event::funds_insufficient(
            payment_id,
            UserId::new("user_123"),
            Money::from_cents(1000),
            Money::from_cents(500),
            EventMetadata::new(),
        );
        saga.apply(&insufficient).unwrap();
        assert_eq!(saga.state(), SagaState::Failed);
    }

    #[test]
    fn external_path_walks_gateway_states() {
        let payment_id = PaymentId::new();
        let saga_id = SagaId::new();
        let events = vec![
            external_request(payment_id, saga_id),
            Event::payment_sent_to_gateway(
                payment_id,
                saga_id,
                "external",
                "gw_1",
                EventMetadata::new(),
            ),
            Event::payment_gateway_response(
                payment_id,
                saga_id,
                "external",
                "SUCCESS",
                "txn_1",
                EventMetadata::new(),
            ),
        ];

        let saga = Saga::fold(&events).unwrap();
        assert_eq!(saga.state(), SagaState::AwaitingResponse);
        assert_eq!(saga.payment_kind(), PaymentKind::External);
        assert_eq!(saga.version(), 3);
    }

    #[test]
    fn retries_and_timeouts_do_not_move_the_state() {
        let payment_id = PaymentId::new();
        let saga_id = SagaId::new();
        let mut saga = Saga::fold(&[external_request(payment_id, saga_id)]).unwrap();
        let version = saga.version();

        saga.apply(&Event::payment_gateway_timeout(
            payment_id,
            saga_id,
            "external",
            1,
            5,
            30,
            EventMetadata::new(),
        ))
        .unwrap();
        saga.apply(&Event::payment_retry_requested(
            payment_id,
            saga_id,
            2,
            "deadline exceeded",
            Utc::now(),
            EventMetadata::new(),
        ))
        .unwrap();

        assert_eq!(saga.state(), SagaState::SendingToGateway);
        assert_eq!(saga.version(), version);
    }

    #[test]
    fn terminal_saga_rejects_further_transitions() {
        let payment_id = PaymentId::new();
        let saga_id = SagaId::new();
        let mut saga = Saga::fold(&[wallet_request(payment_id, saga_id)]).unwrap();

        saga.apply(&Event::funds_debited(
            payment_id,
            UserId::new("user_123"),
            Money::from_cents(1500),
            Money::from_cents(5000),
            Money::from_cents(3500),
            EventMetadata::new(),
        ))
        .unwrap();

        let err = saga
            .apply(&Event::funds_insufficient(
                payment_id,
                UserId::new("user_123"),
                Money::from_cents(1),
                Money::ZERO,
                EventMetadata::new(),
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(saga.state(), SagaState::Completed);
    }

    #[test]
    fn fold_is_deterministic() {
        let payment_id = PaymentId::new();
        let saga_id = SagaId::new();
        let events = vec![
            external_request(payment_id, saga_id),
            Event::payment_sent_to_gateway(
                payment_id,
                saga_id,
                "external",
                "gw_1",
                EventMetadata::new(),
            ),
        ];

        let a = Saga::fold(&events).unwrap();
        let b = Saga::fold(&events).unwrap();
        assert_eq!(a.state(), b.state());
        assert_eq!(a.version(), b.version());
        assert_eq!(a.created_at(), b.created_at());
        assert_eq!(a.last_activity(), b.last_activity());
    }

    #[test]
    fn fold_without_request_event_yields_none() {
        let events = vec![Event::funds_credited(
            uuid::Uuid::new_v4(),
            PaymentId::new(),
            UserId::new("user_123"),
            Money::from_cents(100),
            Money::ZERO,
            Money::from_cents(100),
            "seed",
            EventMetadata::new(),
        )];
        assert!(Saga::fold(&events).is_none());
    }
}
