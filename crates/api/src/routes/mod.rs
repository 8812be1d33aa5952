pub mod auth;
pub mod generation;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/login                        login (public)
///
/// /generate                          create job (POST)
/// /generate/{job_id}                 snapshot (GET)
/// /generate/{job_id}/metrics         timing summary (GET)
/// /generate/{job_id}/stream          server-sent progress events (GET)
/// /generate/{job_id}/ws              WebSocket progress events
/// ```
///
/// Everything except login requires a token.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/generate", generation::router())
}
