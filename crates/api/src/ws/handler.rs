use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vimax_core::job_events::{connected_message, is_control_frame, is_ping, pong_message};
use vimax_db::repositories::JobStatusRepo;
use vimax_db::DbPool;

use crate::state::AppState;
use crate::ws::manager::{ConnectionId, ConnectionStatus, WsSender};

/// GET /api/v1/ws/jobs/{job_id}
///
/// Upgrades to a WebSocket subscribed to one job's status updates.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, job_id, state))
}

/// What the writer task hands back when it stops.
struct WriterExit {
    rx: mpsc::UnboundedReceiver<Message>,
    /// The frame whose write failed, if any.
    failed: Option<Message>,
}

/// Manage a single subscription after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Spawns a writer task that forwards messages from the manager channel.
///   2. Registers with the connection manager, which flushes queued updates
///      and then sends the current snapshot.
///   3. Answers client pings until either side of the socket ends.
///   4. Releases the registration, stops the writer, and hands every status
///      update it did not write back to the manager's queue.
async fn handle_socket(socket: WebSocket, job_id: String, state: AppState) {
    let manager = state.service.connections();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let (sink, mut stream) = socket.split();

    let stop_writer = CancellationToken::new();
    let writer_done = CancellationToken::new();
    let writer = tokio::spawn(write_loop(
        sink,
        rx,
        job_id.clone(),
        stop_writer.clone(),
        writer_done.clone(),
    ));

    let pool = state.pool.clone();
    let greeting_job_id = job_id.clone();
    let conn_id = manager
        .connect(&job_id, tx.clone(), async move {
            Some(current_snapshot(&pool, &greeting_job_id).await)
        })
        .await;

    let final_status = tokio::select! {
        status = read_loop(&mut stream, &tx, &job_id, conn_id) => status,
        _ = writer_done.cancelled() => ConnectionStatus::Disconnected,
    };
    drop(tx);

    // Once released, no further update enters the channel.
    manager.release(&job_id, conn_id, final_status).await;
    stop_writer.cancel();

    let unsent = match writer.await {
        Ok(exit) => unsent_updates(exit),
        Err(e) => {
            tracing::warn!(job_id = %job_id, conn_id, error = %e, "WebSocket writer task failed");
            Vec::new()
        }
    };
    manager.requeue(&job_id, conn_id, unsent).await;
}

/// Forward channel messages to the socket until stopped, the channel
/// closes, a Close frame is written, or a write fails.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    job_id: String,
    stop: CancellationToken,
    done: CancellationToken,
) -> WriterExit {
    let _done = done.drop_guard();
    loop {
        let msg = tokio::select! {
            biased;
            _ = stop.cancelled() => None,
            msg = rx.recv() => msg,
        };
        let Some(msg) = msg else {
            return WriterExit { rx, failed: None };
        };

        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = sink.send(msg.clone()).await {
            tracing::debug!(job_id = %job_id, error = %e, "WebSocket sink closed");
            return WriterExit {
                rx,
                failed: Some(msg),
            };
        }
        if closing {
            return WriterExit { rx, failed: None };
        }
    }
}

/// Answer pings until the client goes away. Returns the status to record.
async fn read_loop(
    stream: &mut SplitStream<WebSocket>,
    tx: &WsSender,
    job_id: &str,
    conn_id: ConnectionId,
) -> ConnectionStatus {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) if is_ping(text.as_str()) => {
                let _ = tx.send(Message::Text(pong_message().to_string().into()));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(job_id = %job_id, conn_id, error = %e, "WebSocket receive error");
                return ConnectionStatus::Error;
            }
        }
    }
    ConnectionStatus::Disconnected
}

/// Status snapshots the writer accepted but never wrote, oldest first.
fn unsent_updates(exit: WriterExit) -> Vec<String> {
    let WriterExit { mut rx, failed } = exit;
    let mut frames: Vec<Message> = failed.into_iter().collect();
    while let Ok(msg) = rx.try_recv() {
        frames.push(msg);
    }

    frames
        .into_iter()
        .filter_map(|msg| match msg {
            Message::Text(text) if !is_control_frame(text.as_str()) => Some(text.as_str().to_owned()),
            _ => None,
        })
        .collect()
}

/// The job's stored snapshot, or a connection notice when none exists yet.
async fn current_snapshot(pool: &DbPool, job_id: &str) -> String {
    match JobStatusRepo::find(pool, job_id).await {
        Ok(Some(record)) => match serde_json::to_string(&record) {
            Ok(text) => return text,
            Err(e) => tracing::error!(job_id = %job_id, error = %e, "Cannot encode snapshot"),
        },
        Ok(None) => {}
        Err(e) => tracing::warn!(job_id = %job_id, error = %e, "Snapshot lookup failed"),
    }
    connected_message(job_id).to_string()
}
