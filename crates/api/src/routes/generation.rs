//! Route definitions for the `/generate` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;
use crate::ws;

/// Routes mounted at `/generate`.
///
/// ```text
/// POST /                   -> create_job
/// GET  /{job_id}           -> get_job
/// GET  /{job_id}/metrics   -> get_metrics
/// GET  /{job_id}/stream    -> stream_job (SSE)
/// GET  /{job_id}/ws        -> job_ws_handler (WebSocket)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(generation::create_job))
        .route("/{job_id}", get(generation::get_job))
        .route("/{job_id}/metrics", get(generation::get_metrics))
        .route("/{job_id}/stream", get(generation::stream_job))
        .route("/{job_id}/ws", get(ws::job_ws_handler))
}
