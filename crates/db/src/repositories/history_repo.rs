//! Repository for the `generation_history` table.

use sqlx::types::Json;
use vimax_core::history::{HistoryEntry, HISTORY_LIMIT};

use crate::models::history::HistoryRow;
use crate::DbPool;

pub struct HistoryRepo;

impl HistoryRepo {
    /// Append an entry and drop everything beyond the newest
    /// [`HISTORY_LIMIT`] entries of that user.
    pub async fn append(pool: &DbPool, user_id: &str, entry: &HistoryEntry) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "INSERT INTO generation_history (user_id, job_id, entry, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user_id)
        .bind(&entry.job_id)
        .bind(Json(entry))
        .bind(entry.timestamp)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM generation_history \
             WHERE user_id = ?1 AND id NOT IN ( \
                 SELECT id FROM generation_history WHERE user_id = ?1 \
                 ORDER BY id DESC LIMIT ?2 \
             )",
        )
        .bind(user_id)
        .bind(HISTORY_LIMIT as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }

    /// A user's history, newest first.
    pub async fn list_for_user(pool: &DbPool, user_id: &str) -> Result<Vec<HistoryEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT id, entry FROM generation_history WHERE user_id = ?1 \
             ORDER BY id DESC LIMIT ?2",
        )
        .bind(user_id)
        .bind(HISTORY_LIMIT as i64)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.entry.0).collect())
    }
}

#[cfg(test)]
mod tests {
    use vimax_core::generation::GenerationRequest;

    use super::*;
    use crate::memory_pool;

    #[tokio::test]
    async fn history_is_capped_and_newest_first() {
        let pool = memory_pool().await.unwrap();
        let request = GenerationRequest::idea2video("x");

        for i in 0..(HISTORY_LIMIT + 5) {
            let entry = HistoryEntry::completed(format!("job_{i}"), &request, "/videos/v.mp4");
            HistoryRepo::append(&pool, "alice", &entry).await.unwrap();
        }
        let other = HistoryEntry::completed("job_bob", &request, "/videos/b.mp4");
        HistoryRepo::append(&pool, "bob", &other).await.unwrap();

        let entries = HistoryRepo::list_for_user(&pool, "alice").await.unwrap();
        assert_eq!(entries.len(), HISTORY_LIMIT);
        assert_eq!(entries[0].job_id, format!("job_{}", HISTORY_LIMIT + 4));
        assert_eq!(entries.last().unwrap().job_id, "job_5");

        assert_eq!(HistoryRepo::list_for_user(&pool, "bob").await.unwrap().len(), 1);
    }
}
