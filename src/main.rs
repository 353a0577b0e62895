//! PayOS HTTP entrypoint.
//!
//! This binary launches an Axum-based HTTP server exposing the simulate →
//! execute payment orchestration surface: simulation/execution, direct
//! transfers and refunds, AP2 mandates, ACP checkouts, agent management,
//! the sandbox x402 facilitator, the capabilities registry, and the cached
//! context aggregators.
//!
//! This server includes:
//! - Structured logging via `tracing`
//! - Request tracing via `TraceLayer`
//! - CORS support for cross-origin clients
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control binding address
//! - `PAYOS_ENVIRONMENT` selects `mock`/`sandbox`/`production`
//! - `PAYOS_ALLOW_PRODUCTION` must be set to unlock production mode

use dotenvy::dotenv;
use payos::config::Config;
use payos::handlers::{self, AppState};
use payos::sig_down::SigDown;
use payos::store::InMemoryStore;
use payos::telemetry::Telemetry;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _telemetry = Telemetry::init();

    let config = Arc::new(Config::load()?);
    tracing::info!(environment = %config.environment(), "configuration loaded");

    let store = InMemoryStore::new();
    let app_state = AppState::new(store, Arc::clone(&config));

    let idempotency_sweeper = app_state.idempotency.spawn_sweeper();
    let cache_sweeper = app_state.cache.spawn_sweeper();

    let http_endpoints = handlers::app(app_state);

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap_or_else(|e| {
        tracing::error!("Failed to bind to {}: {}", addr, e);
        std::process::exit(1);
    });

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints).with_graceful_shutdown(axum_graceful_shutdown).await?;

    idempotency_sweeper.abort();
    cache_sweeper.abort();

    Ok(())
}
