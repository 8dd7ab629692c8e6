use sqlx::types::Json;
use sqlx::FromRow;
use vimax_core::batch::BatchRecord;

/// A row from the `batches` table.
#[derive(Debug, Clone, FromRow)]
pub struct BatchRow {
    pub batch_id: String,
    pub record: Json<BatchRecord>,
}

impl BatchRow {
    pub fn into_record(self) -> BatchRecord {
        self.record.0
    }
}
