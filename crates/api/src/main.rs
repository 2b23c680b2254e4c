//! Single-process entry point: serves the public payments API and the
//! internal wallet API, with every event consumer running in-process.

use api::config::Config;
use api::{StackOptions, build_stack, payments_app, wallet_app};
use dlq::{ErrorLogStore, InMemoryErrorLogStore, PostgresErrorLogStore};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn run<S, E>(store: S, error_log: E, config: Config, metrics_handle: PrometheusHandle)
where
    S: EventStore + Clone + Send + Sync + 'static,
    E: ErrorLogStore + 'static,
{
    let stack = build_stack(store, error_log, StackOptions {
        num_partitions: config.num_partitions,
        ..StackOptions::default()
    })
    .await
    .expect("failed to wire services");

    let payments = payments_app(stack.state.clone(), metrics_handle);
    let wallet = wallet_app(stack.state.clone());

    let payments_listener = tokio::net::TcpListener::bind(config.orchestrator_addr())
        .await
        .expect("failed to bind payments address");
    let wallet_listener = tokio::net::TcpListener::bind(config.wallet_addr())
        .await
        .expect("failed to bind wallet address");

    tracing::info!(
        payments_addr = config.orchestrator_addr(),
        wallet_addr = config.wallet_addr(),
        partitions = config.num_partitions,
        "starting payment saga platform"
    );

    // One signal fans out to both servers; each drains in-flight requests
    // before returning.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    let mut payments_rx = shutdown_rx.clone();
    let mut wallet_rx = shutdown_rx;
    let payments_server = axum::serve(payments_listener, payments)
        .with_graceful_shutdown(async move {
            let _ = payments_rx.changed().await;
        });
    let wallet_server = axum::serve(wallet_listener, wallet)
        .with_graceful_shutdown(async move {
            let _ = wallet_rx.changed().await;
        });

    let (payments_result, wallet_result) = tokio::join!(payments_server, wallet_server);
    payments_result.expect("payments server error");
    wallet_result.expect("wallet server error");

    stack.bus.close();
    stack.dead_letters.close();
    tracing::info!("shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    match config.database_url.clone() {
        Some(url) => {
            let pool = sqlx::PgPool::connect(&url)
                .await
                .expect("failed to connect to database");
            let store = PostgresEventStore::new(pool.clone());
            store.run_migrations().await.expect("migrations failed");
            let error_log = PostgresErrorLogStore::new(pool);
            run(store, error_log, config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory event log");
            run(
                InMemoryEventStore::new(),
                InMemoryErrorLogStore::new(),
                config,
                metrics_handle,
            )
            .await;
        }
    }
}
