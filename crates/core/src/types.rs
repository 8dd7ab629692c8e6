/// Opaque job identifier, e.g. `job_3f2a...`.
pub type JobId = String;

/// Opaque batch identifier, e.g. `batch_9c1d...`.
pub type BatchId = String;

/// Owning principal. Authentication happens upstream; the core only carries it.
pub type UserId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh job identifier.
pub fn new_job_id() -> JobId {
    format!("job_{}", uuid::Uuid::new_v4().simple())
}

/// Generate a fresh batch identifier.
pub fn new_batch_id() -> BatchId {
    format!("batch_{}", uuid::Uuid::new_v4().simple())
}

/// Identifier of the job at `index` inside a batch.
pub fn batch_job_id(batch_id: &str, index: usize) -> JobId {
    format!("{batch_id}_job_{index}")
}
