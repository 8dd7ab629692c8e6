use sqlx::types::Json;
use sqlx::FromRow;
use vimax_core::history::HistoryEntry;

/// A row from the `generation_history` table.
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub id: i64,
    pub entry: Json<HistoryEntry>,
}
