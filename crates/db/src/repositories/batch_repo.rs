//! Repository for the `batches` table.

use sqlx::types::Json;
use vimax_core::batch::{BatchRecord, BatchStatus};

use crate::models::batch::BatchRow;
use crate::DbPool;

pub struct BatchRepo;

impl BatchRepo {
    /// Insert or overwrite a batch record.
    pub async fn save(pool: &DbPool, batch: &BatchRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO batches (batch_id, user_id, status, record, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (batch_id) DO UPDATE SET \
                 status = excluded.status, \
                 record = excluded.record",
        )
        .bind(&batch.batch_id)
        .bind(&batch.user_id)
        .bind(batch.status.as_str())
        .bind(Json(batch))
        .bind(batch.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find(pool: &DbPool, batch_id: &str) -> Result<Option<BatchRecord>, sqlx::Error> {
        let row = sqlx::query_as::<_, BatchRow>(
            "SELECT batch_id, record FROM batches WHERE batch_id = ?1",
        )
        .bind(batch_id)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(BatchRow::into_record))
    }

    /// All batches of a user, newest first.
    pub async fn list_by_user(pool: &DbPool, user_id: &str) -> Result<Vec<BatchRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, BatchRow>(
            "SELECT batch_id, record FROM batches WHERE user_id = ?1 ORDER BY rowid DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(BatchRow::into_record).collect())
    }

    /// Batches in `status`, oldest first.
    pub async fn list_by_status(
        pool: &DbPool,
        status: BatchStatus,
    ) -> Result<Vec<BatchRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, BatchRow>(
            "SELECT batch_id, record FROM batches WHERE status = ?1 ORDER BY rowid ASC",
        )
        .bind(status.as_str())
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(BatchRow::into_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use vimax_core::generation::GenerationRequest;

    use super::*;
    use crate::memory_pool;

    fn batch(user: &str) -> BatchRecord {
        BatchRecord::new(user, None, vec![GenerationRequest::idea2video("x")]).unwrap()
    }

    #[tokio::test]
    async fn save_overwrites_record() {
        let pool = memory_pool().await.unwrap();
        let mut record = batch("alice");
        BatchRepo::save(&pool, &record).await.unwrap();

        record.mark_processing().unwrap();
        BatchRepo::save(&pool, &record).await.unwrap();

        let found = BatchRepo::find(&pool, &record.batch_id).await.unwrap().unwrap();
        assert_eq!(found.status, BatchStatus::Processing);
        assert!(BatchRepo::list_by_status(&pool, BatchStatus::Queued)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn list_by_user_is_newest_first() {
        let pool = memory_pool().await.unwrap();
        let first = batch("alice");
        let second = batch("alice");
        let other = batch("bob");
        for b in [&first, &second, &other] {
            BatchRepo::save(&pool, b).await.unwrap();
        }

        let ids: Vec<_> = BatchRepo::list_by_user(&pool, "alice")
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.batch_id)
            .collect();
        assert_eq!(ids, vec![second.batch_id, first.batch_id]);
    }
}
