use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use pixelfan_core::error::CoreError;
use pixelfan_core::job_events::{
    WS_CLOSE_INTERNAL_ERROR, WS_CLOSE_JOB_NOT_FOUND, WS_CLOSE_NORMAL, WS_CLOSE_UNAUTHORIZED,
};
use pixelfan_core::types::JobId;
use pixelfan_store::JobStore;

use crate::engine::ProgressSubscription;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::ws::manager::{close_message, WsManager};

/// Why a connection is closed straight after the upgrade.
struct Denial {
    code: u16,
    reason: &'static str,
}

/// HTTP handler that upgrades the connection to a job progress WebSocket.
///
/// The token and the job are checked before the upgrade. A refused
/// connection is still upgraded, then closed at once with a distinct code.
pub async fn job_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    auth: Result<AuthUser, AppError>,
) -> impl IntoResponse {
    let admission = admit(&state.store, &job_id, auth).await;

    ws.on_upgrade(move |socket| async move {
        match admission {
            Ok(()) => handle_socket(socket, state, job_id).await,
            Err(denial) => refuse(socket, &job_id, denial).await,
        }
    })
}

async fn admit(
    store: &JobStore,
    job_id: &str,
    auth: Result<AuthUser, AppError>,
) -> Result<(), Denial> {
    if let Err(e) = auth {
        tracing::debug!(job_id = %job_id, error = %e, "WebSocket auth failed");
        return Err(Denial {
            code: WS_CLOSE_UNAUTHORIZED,
            reason: "Unauthorized",
        });
    }

    match store.get(job_id).await {
        Ok(_) => Ok(()),
        Err(CoreError::NotFound { .. }) => Err(Denial {
            code: WS_CLOSE_JOB_NOT_FOUND,
            reason: "Job not found",
        }),
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "WebSocket admission failed");
            Err(Denial {
                code: WS_CLOSE_INTERNAL_ERROR,
                reason: "Internal error",
            })
        }
    }
}

async fn refuse(mut socket: WebSocket, job_id: &str, denial: Denial) {
    tracing::info!(job_id = %job_id, code = denial.code, "WebSocket refused");
    let _ = socket
        .send(close_message(denial.code, denial.reason))
        .await;
}

/// Manage a single admitted WebSocket connection.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`.
///   2. Spawns a sender task that forwards messages from the manager channel.
///   3. Spawns a progress task that feeds job events into that channel.
///   4. Processes inbound messages until either side closes.
///   5. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, state: AppState, job_id: JobId) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, job_id = %job_id, "WebSocket connected");

    let ws_manager = Arc::clone(&state.ws_manager);
    let mut rx = ws_manager.add(conn_id.clone(), job_id.clone()).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the sink; stop after Close.
    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if is_close {
                break;
            }
        }
    });

    let progress_task = tokio::spawn(relay_progress(
        Arc::clone(&state.store),
        Arc::clone(&ws_manager),
        conn_id.clone(),
        job_id,
    ));

    // Receiver task: clients only send control frames.
    let receiver_conn_id = conn_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(Message::Pong(_)) => {
                    tracing::trace!(conn_id = %receiver_conn_id, "Pong received");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(conn_id = %receiver_conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    progress_task.abort();
    if let Some(conn) = ws_manager.remove(&conn_id).await {
        let watchers = ws_manager.connections_for_job(&conn.job_id).await.len();
        tracing::info!(
            conn_id = %conn_id,
            job_id = %conn.job_id,
            connected_secs = (chrono::Utc::now() - conn.connected_at).num_seconds(),
            remaining_watchers = watchers,
            "WebSocket disconnected",
        );
    } else {
        tracing::info!(conn_id = %conn_id, "WebSocket disconnected after shutdown");
    }
}

/// Push every progress event to the connection as a JSON text frame, then
/// close it with a code describing how the stream ended.
async fn relay_progress(
    store: Arc<JobStore>,
    ws_manager: Arc<WsManager>,
    conn_id: String,
    job_id: JobId,
) {
    let mut subscription = ProgressSubscription::new(store, job_id);

    while let Some(event) = subscription.next().await {
        let frame = match serde_json::to_string(&event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(conn_id = %conn_id, error = %e, "Failed to serialize stream event");
                ws_manager
                    .close(&conn_id, WS_CLOSE_INTERNAL_ERROR, "Internal error")
                    .await;
                return;
            }
        };

        if !ws_manager.send_to(&conn_id, Message::Text(frame.into())).await {
            return;
        }
        if event.is_done() {
            ws_manager
                .close(&conn_id, WS_CLOSE_NORMAL, "Job finished")
                .await;
            return;
        }
    }

    tracing::debug!(
        conn_id = %conn_id,
        job_id = %subscription.job_id(),
        "Job vanished mid-stream",
    );
    ws_manager
        .close(&conn_id, WS_CLOSE_JOB_NOT_FOUND, "Job not found")
        .await;
}
