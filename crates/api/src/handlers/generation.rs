//! Handlers for the `/generate` resource.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::{Stream, StreamExt};
use pixelfan_core::job::{GenerateRequest, Job, JobStatus};
use pixelfan_core::job_events::KEEP_ALIVE_TEXT;
use pixelfan_core::progress::{JobMetrics, JobSnapshot, StreamEvent};
use pixelfan_core::types::JobId;
use serde::Serialize;

use crate::engine::broadcaster::{self, ProgressSubscription};
use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::middleware::json::JsonBody;
use crate::state::AppState;

/// Interval between SSE keep-alive comments on an idle stream.
const SSE_KEEP_ALIVE: Duration = Duration::from_secs(10);

/// Response body for `POST /generate`.
#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// POST /api/generate
///
/// Validate the request, register a pending job and hand it to the runner.
pub async fn create_job(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(input): JsonBody<GenerateRequest>,
) -> AppResult<Json<CreateJobResponse>> {
    let request = input.into_validated()?;
    let job = state
        .store
        .create(Job::new(request.prompt, request.num_images))
        .await?;

    tracing::info!(
        job_id = %job.id(),
        email = %user.email,
        num_images = job.num_images(),
        "Generation job created",
    );
    state.runner.start(job.id());

    Ok(Json(CreateJobResponse {
        job_id: job.id().to_string(),
        status: job.status(),
    }))
}

/// GET /api/generate/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(job_id): Path<String>,
) -> AppResult<Json<JobSnapshot>> {
    Ok(Json(broadcaster::snapshot(&state.store, &job_id).await?))
}

/// GET /api/generate/{job_id}/metrics
pub async fn get_metrics(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(job_id): Path<String>,
) -> AppResult<Json<JobMetrics>> {
    Ok(Json(broadcaster::metrics(&state.store, &job_id).await?))
}

/// GET /api/generate/{job_id}/stream
///
/// Server-sent events: one `progress` event per settled slot, then a single
/// `done`. Unknown jobs are rejected with 404 before the stream opens.
pub async fn stream_job(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.store.get(&job_id).await?;
    tracing::debug!(job_id = %job_id, "SSE subscriber attached");

    let events = ProgressSubscription::new(state.store.clone(), job_id).into_stream();
    let sse = Sse::new(sse_events(events)).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE)
            .text(KEEP_ALIVE_TEXT),
    );

    Ok(([(header::CACHE_CONTROL, "no-cache")], sse))
}

fn sse_events(
    events: impl Stream<Item = StreamEvent> + Send,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    events.filter_map(|event| async move {
        match event.payload_json() {
            Ok(data) => Some(Ok(Event::default().event(event.name()).data(data))),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize stream event");
                None
            }
        }
    })
}
