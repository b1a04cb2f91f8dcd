mod api;
mod config;
mod dispatch;
mod error;
mod geo;
mod models;
mod notify;
mod observability;
mod presence;
mod pricing;
mod sampler;
mod state;
mod store;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let shared_state = Arc::new(state::AppState::new(config.clone()));

    tokio::spawn(presence::run_eviction_sweep(
        shared_state.clone(),
        Duration::from_secs(config.eviction_interval_secs),
        Duration::from_secs(config.presence_ttl_secs),
    ));
    tokio::spawn(dispatch::coordinator::run_expiry_sweep(
        shared_state.clone(),
        Duration::from_secs(config.expiry_interval_secs),
        chrono::Duration::seconds(config.booking_expiry_secs as i64),
    ));
    tokio::spawn(notify::run_presence_broadcast(
        shared_state.clone(),
        Duration::from_secs(config.snapshot_interval_secs),
    ));

    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
