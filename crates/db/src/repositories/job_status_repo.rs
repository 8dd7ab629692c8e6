//! Repository for the `job_status` table.
//!
//! Records are written whole: every `put` is a single-row upsert, so a
//! reader sees either the previous snapshot or the new one.

use sqlx::types::Json;
use vimax_core::job_status::{JobState, JobStatusRecord};

use crate::models::job_status::{JobStatusCounts, JobStatusRow};
use crate::DbPool;

pub struct JobStatusRepo;

impl JobStatusRepo {
    /// Insert or overwrite the record for `record.job_id`.
    pub async fn put(pool: &DbPool, record: &JobStatusRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO job_status (job_id, user_id, status, record, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT (job_id) DO UPDATE SET \
                 status = excluded.status, \
                 record = excluded.record, \
                 updated_at = excluded.updated_at",
        )
        .bind(&record.job_id)
        .bind(&record.user_id)
        .bind(record.status.as_str())
        .bind(Json(record))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find(pool: &DbPool, job_id: &str) -> Result<Option<JobStatusRecord>, sqlx::Error> {
        let row = sqlx::query_as::<_, JobStatusRow>(
            "SELECT job_id, record FROM job_status WHERE job_id = ?1",
        )
        .bind(job_id)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(JobStatusRow::into_record))
    }

    /// Stored jobs grouped by status, for the metrics snapshot.
    pub async fn count_by_status(pool: &DbPool) -> Result<JobStatusCounts, sqlx::Error> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM job_status GROUP BY status")
                .fetch_all(pool)
                .await?;

        let mut counts = JobStatusCounts::default();
        for (status, count) in rows {
            match JobState::ALL.into_iter().find(|s| s.as_str() == status) {
                Some(JobState::Processing) => counts.processing = count,
                Some(JobState::Completed) => counts.completed = count,
                Some(JobState::Failed) => counts.failed = count,
                None => tracing::warn!(status = %status, "Unknown job status in store"),
            }
        }
        Ok(counts)
    }
}
