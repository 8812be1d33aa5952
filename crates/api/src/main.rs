use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pixelfan_api::auth::credentials::DemoCredentials;
use pixelfan_api::config::ServerConfig;
use pixelfan_api::engine::{build_generator, JobRunner, RunnerConfig};
use pixelfan_api::router::build_app_router;
use pixelfan_api::state::AppState;
use pixelfan_api::ws;
use pixelfan_store::JobStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pixelfan_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        max_concurrency = config.max_concurrency,
        retry_attempts = config.retry_attempts,
        "Loaded server configuration",
    );

    let credentials = DemoCredentials::new(&config.auth_email, &config.auth_password)
        .expect("Failed to hash the demo password");

    // --- Job engine ---
    let store = Arc::new(JobStore::new());
    let generator = build_generator(&config).expect("Failed to build generation backend");
    let runner = JobRunner::new(
        Arc::clone(&store),
        generator,
        RunnerConfig::from_server_config(&config),
    );

    // --- WebSocket manager + heartbeat ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_cancel = CancellationToken::new();
    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&ws_manager),
        Duration::from_secs(config.ws_heartbeat_secs),
        heartbeat_cancel.clone(),
    );

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        runner: runner.clone(),
        ws_manager: Arc::clone(&ws_manager),
        credentials: Arc::new(credentials),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    // serve() drains open connections before returning; sockets are closed
    // as soon as the signal arrives.
    let shutdown_ws = Arc::clone(&ws_manager);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let ws_count = shutdown_ws.connection_count().await;
            tracing::info!(ws_count, "Closing WebSocket connections");
            shutdown_ws.shutdown_all().await;
        })
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let active = runner.active_jobs();
    if !active.is_empty() {
        tracing::warn!(count = active.len(), "Abandoning in-flight jobs");
    }

    heartbeat_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), heartbeat_handle).await;
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or (on Unix) SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
