use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use axum::extract::ws::Message;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use vimax_core::job_events::ping_message;
use vimax_core::job_status::JobStatusRecord;
use vimax_core::types::JobId;

use crate::ws::heartbeat;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Identifies one physical connection of a job subscription.
pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Why a message did not reach its subscriber. Never leaves this module:
/// a failed delivery degrades to queueing.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("no live connection")]
    NotConnected,

    #[error("connection channel closed")]
    ChannelClosed,
}

/// Per-job subscription state.
struct Registration {
    status: ConnectionStatus,
    conn_id: ConnectionId,
    sender: Option<WsSender>,
    /// Undelivered snapshots, oldest first.
    pending: VecDeque<String>,
    heartbeat_cancel: Option<CancellationToken>,
}

impl Registration {
    fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            conn_id: 0,
            sender: None,
            pending: VecDeque::new(),
            heartbeat_cancel: None,
        }
    }

    fn send(&self, text: String) -> Result<(), DeliveryError> {
        match (&self.sender, self.status) {
            (Some(sender), ConnectionStatus::Connected) => sender
                .send(Message::Text(text.into()))
                .map_err(|_| DeliveryError::ChannelClosed),
            _ => Err(DeliveryError::NotConnected),
        }
    }

    /// Drop the live connection, keeping the queue.
    fn detach(&mut self, status: ConnectionStatus) {
        if let Some(token) = self.heartbeat_cancel.take() {
            token.cancel();
        }
        self.sender = None;
        self.status = status;
    }
}

/// Delivers job status snapshots to WebSocket subscribers.
///
/// Holds one registration per job, each behind its own lock; the map lock is
/// only held to look a registration up. Updates for a job without a live
/// connection are queued and flushed in order on the next connect.
pub struct ConnectionManager {
    registrations: std::sync::Mutex<HashMap<JobId, Arc<Mutex<Registration>>>>,
    next_conn_id: AtomicU64,
    heartbeat_interval: Duration,
}

impl ConnectionManager {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            registrations: std::sync::Mutex::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
            heartbeat_interval,
        }
    }

    /// The registration for `job_id`, created on first use.
    fn registration(&self, job_id: &str) -> Arc<Mutex<Registration>> {
        let mut registrations = self
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            registrations
                .entry(job_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Registration::new()))),
        )
    }

    fn existing_registration(&self, job_id: &str) -> Option<Arc<Mutex<Registration>>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .cloned()
    }

    fn all_registrations(&self) -> Vec<Arc<Mutex<Registration>>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Attach a subscriber for `job_id`.
    ///
    /// Queued messages are flushed first, then the message produced by
    /// `greeting` (typically the current snapshot). The job's registration
    /// stays locked until both are handed to the channel, so no concurrent
    /// push for the job can overtake them. Other jobs are not affected. Any
    /// older connection for the job is closed.
    pub async fn connect<F>(self: &Arc<Self>, job_id: &str, sender: WsSender, greeting: F) -> ConnectionId
    where
        F: Future<Output = Option<String>>,
    {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let registration = self.registration(job_id);
        let mut reg = registration.lock().await;

        if let Some(old) = reg.sender.take() {
            tracing::debug!(job_id = %job_id, old_conn_id = reg.conn_id, "Replacing connection");
            let _ = old.send(Message::Close(None));
        }
        reg.detach(ConnectionStatus::Connecting);
        reg.conn_id = conn_id;
        reg.sender = Some(sender);
        reg.status = ConnectionStatus::Connected;

        let queued = reg.pending.len();
        while let Some(text) = reg.pending.pop_front() {
            if let Err(e) = reg.send(text.clone()) {
                reg.pending.push_front(text);
                reg.detach(ConnectionStatus::Disconnected);
                tracing::warn!(job_id = %job_id, conn_id, error = %e, "Flush interrupted");
                return conn_id;
            }
        }

        if let Some(text) = greeting.await {
            if reg.send(text).is_err() {
                reg.detach(ConnectionStatus::Disconnected);
                return conn_id;
            }
        }

        let token = CancellationToken::new();
        reg.heartbeat_cancel = Some(token.clone());
        drop(reg);

        heartbeat::spawn_heartbeat(
            Arc::clone(self),
            job_id.to_string(),
            conn_id,
            self.heartbeat_interval,
            token,
        );

        tracing::info!(job_id = %job_id, conn_id, flushed = queued, "WebSocket subscriber connected");
        conn_id
    }

    /// Deliver a status snapshot, or queue it if delivery is not possible.
    pub async fn push(&self, record: &JobStatusRecord) {
        let text = match serde_json::to_string(record) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(job_id = %record.job_id, error = %e, "Cannot encode status update");
                return;
            }
        };

        let registration = self.registration(&record.job_id);
        let mut reg = registration.lock().await;

        match reg.send(text.clone()) {
            Ok(()) => {}
            Err(DeliveryError::NotConnected) => reg.pending.push_back(text),
            Err(e @ DeliveryError::ChannelClosed) => {
                tracing::debug!(job_id = %record.job_id, error = %e, "Delivery failed, queueing");
                reg.detach(ConnectionStatus::Disconnected);
                reg.pending.push_back(text);
            }
        }
    }

    /// Send a heartbeat ping on `conn_id`. Returns `false` once the
    /// connection is gone, which also ends the heartbeat task.
    pub async fn heartbeat(&self, job_id: &str, conn_id: ConnectionId) -> bool {
        let Some(registration) = self.existing_registration(job_id) else {
            return false;
        };
        let mut reg = registration.lock().await;
        if reg.conn_id != conn_id {
            return false;
        }
        match reg.send(ping_message().to_string()) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(job_id = %job_id, conn_id, error = %e, "Heartbeat failed");
                if reg.status == ConnectionStatus::Connected {
                    reg.detach(ConnectionStatus::Disconnected);
                }
                false
            }
        }
    }

    /// Mark the job's subscription disconnected, keeping its queue.
    pub async fn disconnect(&self, job_id: &str) {
        if let Some(registration) = self.existing_registration(job_id) {
            registration.lock().await.detach(ConnectionStatus::Disconnected);
            tracing::info!(job_id = %job_id, "WebSocket subscriber disconnected");
        }
    }

    /// Like [`disconnect`](Self::disconnect), but only if `conn_id` is still
    /// the job's current connection. Used by socket tasks on exit.
    pub async fn release(&self, job_id: &str, conn_id: ConnectionId, status: ConnectionStatus) {
        if let Some(registration) = self.existing_registration(job_id) {
            let mut reg = registration.lock().await;
            if reg.conn_id == conn_id && reg.sender.is_some() {
                reg.detach(status);
                tracing::info!(job_id = %job_id, conn_id, status = ?status, "WebSocket subscriber released");
            }
        }
    }

    /// Put updates that were accepted for `conn_id` but never written to
    /// its socket back at the head of the job's queue, oldest first.
    ///
    /// Call after [`release`](Self::release). If a newer connection has
    /// already taken over, it was greeted with the current snapshot and the
    /// older updates are dropped.
    pub async fn requeue(&self, job_id: &str, conn_id: ConnectionId, unsent: Vec<String>) {
        if unsent.is_empty() {
            return;
        }
        let registration = self.registration(job_id);
        let mut reg = registration.lock().await;

        if reg.conn_id != conn_id || reg.sender.is_some() {
            tracing::debug!(
                job_id = %job_id,
                conn_id,
                dropped = unsent.len(),
                "Unsent updates superseded by a newer connection",
            );
            return;
        }
        let count = unsent.len();
        for text in unsent.into_iter().rev() {
            reg.pending.push_front(text);
        }
        tracing::debug!(job_id = %job_id, conn_id, count, "Requeued unsent updates");
    }

    pub async fn connection_status(&self, job_id: &str) -> Option<ConnectionStatus> {
        let registration = self.existing_registration(job_id)?;
        let status = registration.lock().await.status;
        Some(status)
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        let mut count = 0;
        for registration in self.all_registrations() {
            if registration.lock().await.status == ConnectionStatus::Connected {
                count += 1;
            }
        }
        count
    }

    pub async fn queued_count(&self, job_id: &str) -> usize {
        match self.existing_registration(job_id) {
            Some(registration) => registration.lock().await.pending.len(),
            None => 0,
        }
    }

    /// Send a Close frame to every live connection and stop all heartbeats.
    ///
    /// Used during graceful shutdown.
    pub async fn shutdown_all(&self) {
        let mut count = 0;
        for registration in self.all_registrations() {
            let mut reg = registration.lock().await;
            if let Some(sender) = &reg.sender {
                let _ = sender.send(Message::Close(None));
                count += 1;
            }
            reg.detach(ConnectionStatus::Disconnected);
        }
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
