//! Live per-job progress over Server-Sent Events.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use keeper_events::EventBus;
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;

use keeper_core::BackupId;

use crate::app::errors;
use crate::app::services::AppServices;

/// GET /api/backups/:id/stream
///
/// Streams progress snapshots for one in-flight job as SSE `progress` events,
/// closing after the job's terminal snapshot. Answers 404 when the id names
/// no active job; a finished job's outcome lives in the history catalog.
pub async fn stream_progress(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: BackupId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid backup id");
        }
    };
    // Subscribe before the existence check so the snapshots published
    // between check and subscribe cannot be missed.
    let subscription = services.orchestrator().bus().subscribe();
    if services.orchestrator().registry().get(id).is_none() {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "no active job with that id");
    }

    let (tx, rx) = unbounded_channel::<Result<SseEvent, std::convert::Infallible>>();

    // Forwarding loop: the bus subscription blocks, so it lives on the
    // blocking pool and feeds the async SSE stream through the channel.
    tokio::task::spawn_blocking(move || {
        let mut last_heartbeat = std::time::Instant::now();
        loop {
            match subscription.recv_timeout(Duration::from_millis(1000)) {
                Ok(snapshot) => {
                    if snapshot.id != id {
                        continue;
                    }
                    let terminal = snapshot.stage.is_terminal();
                    let json = match serde_json::to_string(&snapshot) {
                        Ok(s) => s,
                        Err(_) => continue,
                    };
                    if tx
                        .send(Ok(SseEvent::default().event("progress").data(json)))
                        .is_err()
                    {
                        break; // client disconnected
                    }
                    last_heartbeat = std::time::Instant::now();
                    if terminal {
                        break;
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    if last_heartbeat.elapsed() > Duration::from_secs(15) {
                        let heartbeat = SseEvent::default().event("heartbeat").data("{}");
                        if tx.send(Ok(heartbeat)).is_err() {
                            break;
                        }
                        last_heartbeat = std::time::Instant::now();
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    break; // bus dropped
                }
            }
        }
    });

    let stream = UnboundedReceiverStream::new(rx);
    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}
