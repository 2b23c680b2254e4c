//! HTTP surface and process wiring for the payment saga platform.
//!
//! Two routers: the public payments API (creation + status) and the
//! internal wallet API (balance + refunds). The wiring assembles the event
//! log, the bus, the participants and the dead-letter path into one
//! running system; all consumers share a single topic and are separated by
//! consumer group.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use dlq::{DeadLetterQueue, DeadLetterSink, ErrorLogPersister, ErrorLogStore};
use event_bus::{
    EventBus, GROUP_EXTERNAL_PAYMENT, GROUP_ORCHESTRATOR, GROUP_WALLET, InMemoryEventBus,
    TOPIC_PAYMENTS,
};
use event_store::EventStore;
use gateway::{ExternalPaymentService, MockPaymentGateway, RetryPolicy};
use metrics_exporter_prometheus::PrometheusHandle;
use orchestrator::Orchestrator;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use wallet::WalletService;

/// Shared state behind both routers.
pub struct AppState<S, B> {
    pub orchestrator: Arc<Orchestrator<S, B>>,
    pub wallet: Arc<WalletService<S, B>>,
}

/// Builds the public payments router.
pub fn payments_app<S, B>(state: Arc<AppState<S, B>>, metrics_handle: PrometheusHandle) -> Router
where
    S: EventStore + 'static,
    B: EventBus + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/api/payments/wallet", post(routes::payments::create_wallet::<S, B>))
        .route(
            "/api/payments/creditcard",
            post(routes::payments::create_creditcard::<S, B>),
        )
        .route("/api/v1/payments/{id}", get(routes::payments::status::<S, B>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the internal wallet router.
pub fn wallet_app<S, B>(state: Arc<AppState<S, B>>) -> Router
where
    S: EventStore + 'static,
    B: EventBus + 'static,
{
    Router::new()
        .route("/health", get(routes::health::check))
        .route("/internal/wallet/{user_id}", get(routes::wallet::balance::<S, B>))
        .route("/internal/wallet/refund", post(routes::wallet::refund::<S, B>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Tunables for [`build_stack`]. Production values by default; tests dial
/// the retry policy and delays down to milliseconds.
pub struct StackOptions {
    pub num_partitions: usize,
    pub retry_policy: RetryPolicy,
    pub attempt_timeout: Duration,
    pub webhook_delay: Duration,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            num_partitions: event_bus::DEFAULT_NUM_PARTITIONS,
            retry_policy: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(30),
            webhook_delay: Duration::from_millis(200),
        }
    }
}

/// A fully wired system sharing one event log and one bus.
pub struct Stack<S> {
    pub state: Arc<AppState<S, InMemoryEventBus>>,
    pub store: S,
    pub bus: InMemoryEventBus,
    pub gateway: MockPaymentGateway,
    pub dead_letters: DeadLetterQueue,
}

/// Errors that can occur while wiring the system together.
#[derive(Debug, Error)]
pub enum WiringError {
    #[error("event bus wiring failed: {0}")]
    Bus(#[from] event_bus::EventBusError),

    #[error("dead-letter wiring failed: {0}")]
    DeadLetter(#[from] dlq::DlqError),
}

/// Wires the orchestrator, both participants, and the dead-letter
/// persistence onto a shared log and bus, and subscribes every consumer
/// under its fixed group id.
pub async fn build_stack<S, E>(
    store: S,
    error_log: E,
    options: StackOptions,
) -> Result<Stack<S>, WiringError>
where
    S: EventStore + Clone + Send + Sync + 'static,
    E: ErrorLogStore + 'static,
{
    let bus = InMemoryEventBus::new(options.num_partitions);
    let gateway = MockPaymentGateway::new();
    let dead_letters = DeadLetterQueue::default();

    let orchestrator = Arc::new(Orchestrator::new(store.clone(), bus.clone()));
    let wallet_service = Arc::new(WalletService::new(store.clone(), bus.clone()));
    let external_payments = Arc::new(
        ExternalPaymentService::new(
            store.clone(),
            bus.clone(),
            gateway.clone(),
            dead_letters.clone(),
        )
        .with_retry_policy(options.retry_policy)
        .with_attempt_timeout(options.attempt_timeout)
        .with_webhook_delay(options.webhook_delay),
    );

    dead_letters
        .subscribe(Arc::new(ErrorLogPersister::new(error_log)))
        .await?;

    bus.subscribe(TOPIC_PAYMENTS, GROUP_WALLET, wallet_service.clone())
        .await?;
    bus.subscribe(TOPIC_PAYMENTS, GROUP_EXTERNAL_PAYMENT, external_payments)
        .await?;
    bus.subscribe(TOPIC_PAYMENTS, GROUP_ORCHESTRATOR, orchestrator.clone())
        .await?;

    let state = Arc::new(AppState {
        orchestrator,
        wallet: wallet_service,
    });

    Ok(Stack {
        state,
        store,
        bus,
        gateway,
        dead_letters,
    })
}
