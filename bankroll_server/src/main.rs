//! Bankroll ledger REST server.
//!
//! Serves the wallet and self-exclusion API over a shared PostgreSQL
//! ledger, with balance serialization through a redis lock store and a
//! background expiry scheduler for time-driven exclusion transitions.

use bankroll_server::{api, config, logging, metrics};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use bankroll::db::Database;
use bankroll::ledger::LedgerManager;
use bankroll::lock::{AcquireOptions, LockManager, SharedCounter, connect_store};
use bankroll::scheduler::ExpirySweep;
use config::ServerConfig;
use ctrlc::set_handler;
use log::info;
use pico_args::Arguments;

const HELP: &str = "\
Run the bankroll ledger server

USAGE:
  bankroll_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string (required)
  REDIS_URL                Lock store connection string
  JWT_SECRET               JWT validation secret (required)
  METRICS_BIND             Prometheus exporter bind address (optional)
  SWEEP_INTERVAL_SECS      Expiry scheduler interval
  LOCK_TTL_MS              Balance lock TTL
  (See .env file for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let db_url_override: Option<String> = pargs.opt_value_from_str("--db-url")?;

    // Catching signals for exit.
    set_handler(|| std::process::exit(0))?;

    logging::init();

    let config = ServerConfig::from_env(bind_override, db_url_override)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(Error::msg)?;
        info!("Prometheus metrics exported at http://{addr}/metrics");
    }

    info!("Connecting to database");
    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    db.ensure_schema()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bootstrap schema: {}", e))?;
    info!("Database connected, schema in place");

    info!("Connecting to lock store at {}", config.redis_url);
    let store = connect_store(&config.redis_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to lock store: {}", e))?;
    let locks = LockManager::new(store.clone());
    let limiter = SharedCounter::new(store);

    let pool = Arc::new(db.pool().clone());
    let acquire = AcquireOptions {
        retry_count: config.lock.retry_count,
        retry_delay: Duration::from_millis(config.lock.retry_delay_ms),
    };
    let ledger = Arc::new(
        LedgerManager::new(pool.clone(), locks)
            .with_lock_settings(Duration::from_millis(config.lock.ttl_ms), acquire),
    );

    // Time-driven exclusion transitions run from every worker; the
    // conditional statements keep concurrent sweeps safe.
    let sweep_handle = ExpirySweep::new(pool.clone()).spawn(config.sweep_interval);
    info!(
        "Expiry scheduler running every {}s",
        config.sweep_interval.as_secs()
    );

    let api_state = api::AppState {
        ledger,
        limiter,
        jwt_secret: config.security.jwt_secret.clone(),
        pool,
    };
    let app = api::create_router(api_state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");
    sweep_handle.abort();

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to install CTRL+C signal handler: {err}");
    }
}
