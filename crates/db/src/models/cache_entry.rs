//! Cache index rows.

use serde::Serialize;
use sqlx::FromRow;
use vimax_core::types::Timestamp;

/// A row from the `cache_entries` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct CacheEntry {
    pub cache_key: String,
    /// File name relative to the cache directory.
    pub file_name: String,
    pub size_bytes: i64,
    /// Canonicalised parameter set the key was computed from.
    pub params: sqlx::types::Json<serde_json::Value>,
    pub created_at: Timestamp,
}

impl CacheEntry {
    /// An entry is live while its age is strictly below `ttl`.
    pub fn is_expired(&self, now: Timestamp, ttl: chrono::Duration) -> bool {
        now - self.created_at >= ttl
    }
}

/// Aggregate size of the cache index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize)]
pub struct CacheStats {
    pub entries: i64,
    pub size_bytes: i64,
}
