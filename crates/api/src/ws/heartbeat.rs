use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::ws::manager::{ConnectionId, ConnectionManager};

/// Spawn the heartbeat task for one connection.
///
/// Sends `{"type":"ping"}` every `interval` until `cancel` fires or a ping
/// fails. A failed ping marks the subscription disconnected, exactly like
/// a failed status push.
pub fn spawn_heartbeat(
    manager: Arc<ConnectionManager>,
    job_id: String,
    conn_id: ConnectionId,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::trace!(job_id = %job_id, conn_id, "Heartbeat cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if !manager.heartbeat(&job_id, conn_id).await {
                        break;
                    }
                    tracing::trace!(job_id = %job_id, conn_id, "Heartbeat sent");
                }
            }
        }
    })
}
