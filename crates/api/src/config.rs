//! Service configuration loaded from environment variables.

/// Configuration with production defaults.
///
/// Environment variables:
/// - `DATABASE_URL` — PostgreSQL connection string; absent means the
///   in-memory event log (local development only)
/// - `ORCHESTRATOR_PORT` — public payments API port (default `8080`)
/// - `WALLET_PORT` — internal wallet API port (default `8081`)
/// - `EVENT_PARTITIONS` — partitions per topic (default `12`)
/// - `RUST_LOG` — tracing filter directive (default `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub orchestrator_port: u16,
    pub wallet_port: u16,
    pub num_partitions: usize,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            orchestrator_port: std::env::var("ORCHESTRATOR_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            wallet_port: std::env::var("WALLET_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8081),
            num_partitions: std::env::var("EVENT_PARTITIONS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(event_bus::DEFAULT_NUM_PARTITIONS),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn orchestrator_addr(&self) -> String {
        format!("0.0.0.0:{}", self.orchestrator_port)
    }

    pub fn wallet_addr(&self) -> String {
        format!("0.0.0.0:{}", self.wallet_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            orchestrator_port: 8080,
            wallet_port: 8081,
            num_partitions: event_bus::DEFAULT_NUM_PARTITIONS,
            log_level: "info".to_string(),
        }
    }
}
