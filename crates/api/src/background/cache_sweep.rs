//! Periodic eviction of expired cache entries.
//!
//! Lookups already evict expired entries lazily; this loop reclaims disk
//! for keys nobody asks for again.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::engine::cache::CacheIndex;

/// Run the cache sweep loop until `cancel` is triggered.
///
/// The first sweep happens one `interval` after start; startup already
/// sweeps once.
pub async fn run(cache: Arc<CacheIndex>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Cache sweep job started");

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Cache sweep job stopping");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = cache.sweep().await {
                    tracing::error!(error = %e, "Cache sweep failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweep_loop_evicts_expired_entries_and_stops_on_cancel() {
        let pool = vimax_db::memory_pool().await.expect("pool");
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Arc::new(CacheIndex::new(
            pool,
            dir.path().join("cache"),
            chrono::Duration::zero(),
        ));

        let artifact = dir.path().join("video.mp4");
        tokio::fs::write(&artifact, b"bytes").await.expect("write");
        let params = serde_json::json!({"idea": "sweep"});
        let key = vimax_core::fingerprint::fingerprint(&params);
        cache.insert(&key, &artifact, &params).await.expect("insert");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            Arc::clone(&cache),
            Duration::from_millis(20),
            cancel.clone(),
        ));

        let mut entries = 1;
        for _ in 0..50 {
            entries = cache.stats().await.expect("stats").entries;
            if entries == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(entries, 0);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop stops")
            .expect("task joins");
    }
}
