//! WebSocket delivery of job status updates.
//!
//! Provides the per-job connection manager, the per-connection liveness
//! heartbeat, and the HTTP upgrade handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::ws_handler;
pub use manager::{ConnectionManager, ConnectionStatus};
