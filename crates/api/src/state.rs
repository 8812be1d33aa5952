use std::sync::Arc;

use pixelfan_store::JobStore;

use crate::auth::credentials::DemoCredentials;
use crate::config::ServerConfig;
use crate::engine::JobRunner;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Process-lifetime job registry.
    pub store: Arc<JobStore>,
    /// Drives jobs to completion in the background.
    pub runner: JobRunner,
    /// Open WebSocket progress connections.
    pub ws_manager: Arc<WsManager>,
    pub credentials: Arc<DemoCredentials>,
}
