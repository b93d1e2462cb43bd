//! Portal
//!
//! Signaling gateway: admits participants with single-use tokens and routes
//! their actions to the room controller that owns their room.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment, initialize tracing
//! 2. Initialize Prometheus metrics recorder
//! 3. Connect the Redis token store
//! 4. Build the RPC client and the session router
//! 5. Start health HTTP server (liveness, readiness, metrics)
//! 6. Spawn the room stats task and the SIGHUP key reload task
//! 7. Wait for shutdown signal

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::secret::ExposeSecret;
use portal_service::auth::TokenValidator;
use portal_service::config::{load_token_key_file, Config, LogFormat};
use portal_service::observability::metrics::init_metrics_recorder;
use portal_service::observability::{
    health_router, metrics_router, HealthState, MetricsAggregator, TracingMetricSink,
};
use portal_service::services::{
    ControllerLocator, HttpRpcClient, RedisTokenStore, SessionDirectory, SessionRouter,
};
use portal_service::tasks::{start_room_stats_task, ROOM_STATS_INTERVAL};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long background tasks get to stop after cancellation.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    init_tracing(config.as_ref().map_or(LogFormat::Text, |c| c.log_format));

    info!("Starting Portal");

    let config = config.map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        cluster_name = %config.cluster_name,
        rpc_id = %config.rpc_id,
        rpc_url = %config.rpc_url,
        rpc_timeout_seconds = config.rpc_timeout.as_secs(),
        health_bind_address = %config.health_bind_address,
        key_file_configured = config.token_key_file.is_some(),
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to initialize metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    info!("Connecting to Redis...");
    let token_store = RedisTokenStore::new(config.redis_url.expose_secret())
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to connect to Redis");
            e
        })?;
    info!("Redis connection established");

    let rpc_client = Arc::new(HttpRpcClient::new(&config.rpc_url, config.rpc_timeout)?);

    let directory = Arc::new(SessionDirectory::new());
    let aggregator = Arc::new(MetricsAggregator::new(Arc::new(TracingMetricSink)));
    let locator = ControllerLocator::new(rpc_client.clone(), config.cluster_name.clone());
    info!(cluster = %locator.cluster_name(), "Controller locator initialized");

    let router = Arc::new(SessionRouter::new(
        Arc::clone(&directory),
        TokenValidator::new(config.token_key.clone(), Arc::new(token_store)),
        locator,
        rpc_client,
        Arc::clone(&aggregator),
        config.rpc_id.clone(),
    ));
    info!(rpc_id = %router.rpc_id(), "Session router initialized");

    let shutdown_token = CancellationToken::new();

    // Health server MUST bind; fail startup otherwise
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let app = health_router(Arc::clone(&health_state))
        .merge(metrics_router(prometheus_handle))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    let room_stats_handle = tokio::spawn(start_room_stats_task(
        Arc::clone(&directory),
        Arc::clone(&aggregator),
        ROOM_STATS_INTERVAL,
        shutdown_token.child_token(),
    ));

    tokio::spawn(run_key_reload(
        Arc::clone(&router),
        config.token_key_file.clone(),
        shutdown_token.child_token(),
    ));

    health_state.set_ready();
    info!("Portal running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    health_state.set_not_ready();
    shutdown_token.cancel();

    match tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, room_stats_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Room stats task ended abnormally"),
        Err(_) => warn!("Room stats task did not stop in time"),
    }

    info!(
        participants = directory.len().await,
        "Portal shutdown complete"
    );
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "portal_service=debug,portal=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Re-read the signing key file on SIGHUP and hand it to the router.
///
/// A read failure keeps the current key.
#[cfg(unix)]
async fn run_key_reload(
    router: Arc<SessionRouter>,
    key_file: Option<PathBuf>,
    cancel_token: CancellationToken,
) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGHUP handler, key reload disabled");
            return;
        }
    };

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }
                let Some(path) = key_file.as_deref() else {
                    warn!("SIGHUP received but PORTAL_TOKEN_KEY_FILE is not set");
                    continue;
                };
                match load_token_key_file(path) {
                    Ok(key) => router.update_token_key(key).await,
                    Err(e) => error!(error = %e, "Failed to reload token key, keeping current key"),
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn run_key_reload(
    _router: Arc<SessionRouter>,
    _key_file: Option<PathBuf>,
    cancel_token: CancellationToken,
) {
    cancel_token.cancelled().await;
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
