//! Content-addressed cache of generated artifacts.
//!
//! Each entry is one row in `cache_entries` plus one file `{key}.{ext}` in
//! the cache directory. Every operation on a key runs under that key's async
//! lock, so a reader never sees a row whose file is being replaced or
//! removed, while operations on different keys proceed independently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::Utc;
use sqlx::types::Json;
use vimax_core::fingerprint::{canonicalize, CacheKey};
use vimax_db::models::cache_entry::{CacheEntry, CacheStats};
use vimax_db::repositories::CacheEntryRepo;
use vimax_db::DbPool;

/// URL prefix under which cached artifacts are served.
pub const CACHE_URL_PREFIX: &str = "/cache";

/// Extension used when the artifact path has none.
const DEFAULT_EXTENSION: &str = "mp4";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache index error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Refusing to cache empty artifact {0}")]
    EmptyArtifact(PathBuf),
}

/// A live cache entry resolved to its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    pub key: CacheKey,
    pub file_name: String,
    pub path: PathBuf,
}

impl CachedArtifact {
    /// Public URL of the cached file.
    pub fn url(&self) -> String {
        format!("{CACHE_URL_PREFIX}/{}", self.file_name)
    }
}

pub struct CacheIndex {
    pool: DbPool,
    dir: PathBuf,
    ttl: chrono::Duration,
    locks: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl CacheIndex {
    pub fn new(pool: DbPool, dir: impl Into<PathBuf>, ttl: chrono::Duration) -> Self {
        Self {
            pool,
            dir: dir.into(),
            ttl,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Shared lock for `key`. Locks are dropped once no task holds them.
    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(key).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(key.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Resolve a live entry. Expired entries, and entries whose file has
    /// vanished, are removed and reported as a miss.
    pub async fn lookup(&self, key: &CacheKey) -> Result<Option<CachedArtifact>, CacheError> {
        let lock = self.key_lock(key.as_str());
        let _guard = lock.lock().await;

        let Some(entry) = CacheEntryRepo::find(&self.pool, key.as_str()).await? else {
            return Ok(None);
        };

        if entry.is_expired(Utc::now(), self.ttl) {
            tracing::info!(cache_key = %key, "Evicting expired cache entry on lookup");
            self.evict_locked(&entry).await?;
            return Ok(None);
        }

        let path = self.dir.join(&entry.file_name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(CachedArtifact {
                key: key.clone(),
                file_name: entry.file_name,
                path,
            })),
            _ => {
                tracing::warn!(
                    cache_key = %key,
                    path = %path.display(),
                    "Cache file missing, dropping entry",
                );
                CacheEntryRepo::delete(&self.pool, key.as_str()).await?;
                Ok(None)
            }
        }
    }

    /// Copy `artifact` into cache storage under `key` and record it.
    ///
    /// Re-inserting a key replaces both the file and the row.
    pub async fn insert(
        &self,
        key: &CacheKey,
        artifact: &Path,
        params: &serde_json::Value,
    ) -> Result<CachedArtifact, CacheError> {
        let ext = artifact
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(DEFAULT_EXTENSION);
        let file_name = format!("{key}.{ext}");
        let target = self.dir.join(&file_name);

        let lock = self.key_lock(key.as_str());
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = self.dir.join(format!(".{key}.{}.tmp", uuid::Uuid::new_v4().simple()));

        let size = match tokio::fs::copy(artifact, &tmp).await {
            Ok(0) => {
                remove_file_if_exists(&tmp).await?;
                return Err(CacheError::EmptyArtifact(artifact.to_path_buf()));
            }
            Ok(size) => size,
            Err(e) => {
                remove_file_if_exists(&tmp).await?;
                return Err(e.into());
            }
        };
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            remove_file_if_exists(&tmp).await?;
            return Err(e.into());
        }

        if let Some(previous) = CacheEntryRepo::find(&self.pool, key.as_str()).await? {
            if previous.file_name != file_name {
                remove_file_if_exists(&self.dir.join(&previous.file_name)).await?;
            }
        }

        let entry = CacheEntry {
            cache_key: key.to_string(),
            file_name: file_name.clone(),
            size_bytes: i64::try_from(size).unwrap_or(i64::MAX),
            params: Json(canonicalize(params)),
            created_at: Utc::now(),
        };
        CacheEntryRepo::upsert(&self.pool, &entry).await?;

        tracing::info!(cache_key = %key, size_bytes = size, "Cached artifact");
        Ok(CachedArtifact {
            key: key.clone(),
            file_name,
            path: target,
        })
    }

    /// Remove every expired entry. Returns the number evicted.
    pub async fn sweep(&self) -> Result<usize, CacheError> {
        let now = Utc::now();
        let expired: Vec<CacheEntry> = CacheEntryRepo::list_all(&self.pool)
            .await?
            .into_iter()
            .filter(|entry| entry.is_expired(now, self.ttl))
            .collect();

        let mut evicted = 0;
        for candidate in expired {
            let lock = self.key_lock(&candidate.cache_key);
            let _guard = lock.lock().await;

            // Re-read under the lock: the key may have been re-inserted.
            match CacheEntryRepo::find(&self.pool, &candidate.cache_key).await? {
                Some(entry) if entry.is_expired(Utc::now(), self.ttl) => {
                    self.evict_locked(&entry).await?;
                    evicted += 1;
                }
                _ => {}
            }
        }

        if evicted > 0 {
            tracing::info!(evicted, "Cache sweep evicted expired entries");
        } else {
            tracing::debug!("Cache sweep found nothing to evict");
        }
        Ok(evicted)
    }

    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        Ok(CacheEntryRepo::stats(&self.pool).await?)
    }

    /// Row first, then file. Caller holds the key lock.
    async fn evict_locked(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        CacheEntryRepo::delete(&self.pool, &entry.cache_key).await?;
        remove_file_if_exists(&self.dir.join(&entry.file_name)).await?;
        Ok(())
    }
}

async fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;
    use vimax_core::fingerprint::fingerprint;

    use super::*;

    struct Fixture {
        cache: CacheIndex,
        pool: DbPool,
        _dir: tempfile::TempDir,
        source: PathBuf,
    }

    async fn fixture(ttl: chrono::Duration) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = vimax_db::memory_pool().await.expect("pool");
        let source = dir.path().join("final_video.mp4");
        tokio::fs::write(&source, b"video bytes").await.expect("write");
        Fixture {
            cache: CacheIndex::new(pool.clone(), dir.path().join("cache"), ttl),
            pool,
            _dir: dir,
            source,
        }
    }

    fn key(idea: &str) -> (CacheKey, serde_json::Value) {
        let params = json!({"idea": idea, "style": "Realistic"});
        (fingerprint(&params), params)
    }

    #[tokio::test]
    async fn insert_then_lookup_hits() {
        let f = fixture(chrono::Duration::days(7)).await;
        let (k, params) = key("cat");

        let inserted = f.cache.insert(&k, &f.source, &params).await.unwrap();
        assert_eq!(inserted.file_name, format!("{k}.mp4"));
        assert_eq!(inserted.url(), format!("/cache/{k}.mp4"));

        let hit = f.cache.lookup(&k).await.unwrap().unwrap();
        assert_eq!(hit, inserted);
        assert_eq!(tokio::fs::read(&hit.path).await.unwrap(), b"video bytes");
    }

    #[tokio::test]
    async fn unknown_key_misses() {
        let f = fixture(chrono::Duration::days(7)).await;
        let (k, _) = key("dog");
        assert!(f.cache.lookup(&k).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entry_is_evicted_with_its_file() {
        let f = fixture(chrono::Duration::zero()).await;
        let (k, params) = key("cat");
        let inserted = f.cache.insert(&k, &f.source, &params).await.unwrap();
        assert!(inserted.path.exists());

        assert!(f.cache.lookup(&k).await.unwrap().is_none());
        assert!(!inserted.path.exists());
        assert!(CacheEntryRepo::find(&f.pool, k.as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_is_a_miss_and_drops_row() {
        let f = fixture(chrono::Duration::days(7)).await;
        let (k, params) = key("cat");
        let inserted = f.cache.insert(&k, &f.source, &params).await.unwrap();
        tokio::fs::remove_file(&inserted.path).await.unwrap();

        assert!(f.cache.lookup(&k).await.unwrap().is_none());
        assert!(CacheEntryRepo::find(&f.pool, k.as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reinsert_replaces_file_and_row() {
        let f = fixture(chrono::Duration::days(7)).await;
        let (k, params) = key("cat");
        f.cache.insert(&k, &f.source, &params).await.unwrap();

        let webm = f.source.with_extension("webm");
        tokio::fs::write(&webm, b"newer and longer").await.unwrap();
        let second = f.cache.insert(&k, &webm, &params).await.unwrap();

        assert!(!f.cache.dir().join(format!("{k}.mp4")).exists());
        assert_eq!(f.cache.lookup(&k).await.unwrap().unwrap(), second);
        let stats = f.cache.stats().await.unwrap();
        assert_eq!(stats, CacheStats { entries: 1, size_bytes: 16 });
    }

    #[tokio::test]
    async fn empty_artifact_is_rejected() {
        let f = fixture(chrono::Duration::days(7)).await;
        let empty = f.source.with_file_name("empty.mp4");
        tokio::fs::write(&empty, b"").await.unwrap();
        let (k, params) = key("cat");

        assert_matches!(
            f.cache.insert(&k, &empty, &params).await,
            Err(CacheError::EmptyArtifact(_))
        );
        assert!(f.cache.lookup(&k).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let f = fixture(chrono::Duration::zero()).await;
        let (old, params) = key("old");
        f.cache.insert(&old, &f.source, &params).await.unwrap();

        let fresh_cache = CacheIndex::new(f.pool.clone(), f.cache.dir(), chrono::Duration::days(7));
        let (fresh, params) = key("fresh");
        fresh_cache.insert(&fresh, &f.source, &params).await.unwrap();

        assert_eq!(f.cache.sweep().await.unwrap(), 1);
        assert!(fresh_cache.lookup(&fresh).await.unwrap().is_some());
        assert_eq!(f.cache.stats().await.unwrap().entries, 1);
    }

    #[tokio::test]
    async fn shortened_ttl_applies_to_existing_entries() {
        let f = fixture(chrono::Duration::days(7)).await;
        let (k, params) = key("cat");
        let inserted = f.cache.insert(&k, &f.source, &params).await.unwrap();

        // Same storage reopened after the TTL was lowered.
        let reopened = CacheIndex::new(f.pool.clone(), f.cache.dir(), chrono::Duration::zero());
        assert!(reopened.lookup(&k).await.unwrap().is_none());
        assert!(!inserted.path.exists());

        let (other, params) = key("dog");
        f.cache.insert(&other, &f.source, &params).await.unwrap();
        assert_eq!(reopened.sweep().await.unwrap(), 1);
        assert_eq!(f.cache.stats().await.unwrap().entries, 0);
    }

    #[tokio::test]
    async fn params_are_stored_canonicalised() {
        let f = fixture(chrono::Duration::days(7)).await;
        let (k, params) = key("cat");
        f.cache.insert(&k, &f.source, &params).await.unwrap();

        let row = CacheEntryRepo::find(&f.pool, k.as_str()).await.unwrap().unwrap();
        assert_eq!(row.params.0, canonicalize(&params));
    }
}
