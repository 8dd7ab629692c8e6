use std::sync::Arc;

use crate::config::ServerConfig;
use crate::engine::GenerationService;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: everything inside is a pool handle or behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: vimax_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job orchestration, batch scheduling, cache, and WebSocket delivery.
    pub service: Arc<GenerationService>,
}
