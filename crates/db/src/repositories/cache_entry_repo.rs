//! Repository for the `cache_entries` table.
//!
//! Expiry is decided by the caller from `created_at` and its TTL; this layer only
//! stores and removes rows. File handling lives with the cache index.

use crate::models::cache_entry::{CacheEntry, CacheStats};
use crate::DbPool;

const COLUMNS: &str = "cache_key, file_name, size_bytes, params, created_at";

pub struct CacheEntryRepo;

impl CacheEntryRepo {
    pub async fn find(pool: &DbPool, cache_key: &str) -> Result<Option<CacheEntry>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM cache_entries WHERE cache_key = ?1");
        sqlx::query_as::<_, CacheEntry>(&query)
            .bind(cache_key)
            .fetch_optional(pool)
            .await
    }

    /// Insert or replace the entry for `entry.cache_key`.
    pub async fn upsert(pool: &DbPool, entry: &CacheEntry) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT INTO cache_entries ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (cache_key) DO UPDATE SET \
                 file_name = excluded.file_name, \
                 size_bytes = excluded.size_bytes, \
                 params = excluded.params, \
                 created_at = excluded.created_at"
        );
        sqlx::query(&query)
            .bind(&entry.cache_key)
            .bind(&entry.file_name)
            .bind(entry.size_bytes)
            .bind(&entry.params)
            .bind(entry.created_at)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Remove a row. Returns whether a row existed.
    pub async fn delete(pool: &DbPool, cache_key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE cache_key = ?1")
            .bind(cache_key)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_all(pool: &DbPool) -> Result<Vec<CacheEntry>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM cache_entries ORDER BY created_at ASC");
        sqlx::query_as::<_, CacheEntry>(&query).fetch_all(pool).await
    }

    pub async fn stats(pool: &DbPool) -> Result<CacheStats, sqlx::Error> {
        sqlx::query_as::<_, CacheStats>(
            "SELECT COUNT(*) AS entries, COALESCE(SUM(size_bytes), 0) AS size_bytes \
             FROM cache_entries",
        )
        .fetch_one(pool)
        .await
    }
}
