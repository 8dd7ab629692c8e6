use sqlx::types::Json;
use sqlx::FromRow;
use vimax_core::job_status::JobStatusRecord;

/// A row from the `job_status` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobStatusRow {
    pub job_id: String,
    pub record: Json<JobStatusRecord>,
}

impl JobStatusRow {
    pub fn into_record(self) -> JobStatusRecord {
        self.record.0
    }
}

/// Number of stored jobs in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStatusCounts {
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}
