use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use catalog_core::job_events::message_type_for;
use catalog_core::progress::ProgressEvent;
use catalog_core::types::DbId;
use catalog_events::ProgressStream;
use futures::{SinkExt, StreamExt};
use serde::Serialize;

use crate::error::AppResult;
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// Wire shape of one progress frame: the event plus its message type.
#[derive(Serialize)]
struct ProgressFrame<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    #[serde(flatten)]
    event: &'a ProgressEvent,
}

/// Encode `event` as a JSON text frame.
pub fn progress_message(event: &ProgressEvent) -> Result<Message, serde_json::Error> {
    let frame = ProgressFrame {
        msg_type: message_type_for(event.status),
        event,
    };
    Ok(Message::Text(serde_json::to_string(&frame)?.into()))
}

/// GET /api/v1/jobs/{id}/ws
///
/// Subscribes before upgrading so an unknown job is a plain 404. The
/// socket then receives the current snapshot, every later event, and is
/// closed after the terminal one.
pub async fn job_progress_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Response> {
    let progress = state.coordinator.subscribe(job_id).await?;
    let ws_manager = Arc::clone(&state.ws_manager);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, job_id, progress, ws_manager)))
}

async fn handle_socket(
    socket: WebSocket,
    job_id: DbId,
    mut progress: ProgressStream,
    ws_manager: Arc<WsManager>,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, job_id, "Progress WebSocket connected");

    let mut control = ws_manager.add(conn_id.clone(), job_id).await;
    let (mut sink, mut inbound) = socket.split();

    loop {
        tokio::select! {
            event = progress.next() => {
                let Some(event) = event else { break };
                let terminal = event.is_terminal();
                let message = match progress_message(&event) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::error!(
                            conn_id = %conn_id,
                            job_id,
                            error = %e,
                            "Failed to encode progress frame"
                        );
                        break;
                    }
                };
                if sink.send(message).await.is_err() {
                    tracing::debug!(conn_id = %conn_id, "WebSocket sink closed");
                    break;
                }
                if terminal {
                    let close = Message::Close(Some(CloseFrame {
                        code: close_code::NORMAL,
                        reason: "job finished".into(),
                    }));
                    let _ = sink.send(close).await;
                    break;
                }
            }
            frame = control.recv() => {
                let Some(frame) = frame else { break };
                let closing = matches!(frame, Message::Close(_));
                if sink.send(frame).await.is_err() || closing {
                    break;
                }
            }
            incoming = inbound.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    ws_manager.remove(&conn_id).await;
    tracing::info!(conn_id = %conn_id, job_id, "Progress WebSocket disconnected");
}
