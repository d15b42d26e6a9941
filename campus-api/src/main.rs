//! SmartCampus API Server Entry Point
//!
//! Loads configuration, starts the reminder job and serves the Axum router.

use std::sync::Arc;

use campus_api::jobs::{spawn_notification_job, NotificationConfig};
use campus_api::telemetry::{init_logging, LoggingConfig};
use campus_api::{
    create_router, ApiError, ApiResult, AppState, AuthConfig, CampusStore, EventBus, ServerConfig,
};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_logging(&LoggingConfig::from_env())?;

    let server_config = ServerConfig::from_env()?;
    server_config.validate_for_production()?;
    let auth_config = AuthConfig::from_env();
    auth_config.validate_for_production()?;

    let store = Arc::new(CampusStore::new());
    let events = EventBus::new(server_config.event_capacity);
    let state = AppState::new(store.clone(), events.clone(), Arc::new(auth_config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let job = spawn_notification_job(store, events, NotificationConfig::from_env(), shutdown_rx);

    let app = create_router(state, &server_config);
    let addr = server_config.bind_addr()?;
    tracing::info!(%addr, "Starting SmartCampus API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(job) = job {
        match job.await {
            Ok(runs) => tracing::info!(runs, "Notification job stopped"),
            Err(e) => tracing::warn!(error = %e, "Notification job ended abnormally"),
        }
    }
    Ok(())
}
