//! Compaction Task
//!
//! Background task that periodically runs a compaction pass: expired
//! entries are dropped and, if a resource budget is exceeded, entries
//! are evicted by recency. The task takes the same lock as foreground
//! operations, so it interleaves with them but never races them.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::LocalCache;

/// Spawns a background task that periodically compacts the cache.
///
/// Compaction also runs synchronously after growing operations; the
/// periodic tick exists so that expired entries of an otherwise idle
/// cache still get dropped.
///
/// # Arguments
/// * `cache` - Handle to the cache to compact
/// * `interval` - Time between compaction passes
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the
/// task during shutdown.
pub fn spawn_compaction_task(cache: LocalCache, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs_f64(), "starting compaction task");

        loop {
            tokio::time::sleep(interval).await;

            let report = cache.compact().await;

            if !report.is_noop() {
                info!(
                    expired = report.expired,
                    evicted = report.evicted,
                    "compaction tick removed entries"
                );
            } else {
                debug!("compaction tick found nothing to do");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::CacheOptions;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;

    #[tokio::test]
    async fn test_compaction_task_removes_expired_entries() {
        let cache = LocalCache::new(CacheOptions::default()).unwrap();

        cache
            .set(
                "expire_soon",
                json!("value"),
                Some(Utc::now() + ChronoDuration::milliseconds(100)),
            )
            .await
            .unwrap();

        let handle = spawn_compaction_task(cache.clone(), Duration::from_millis(100));

        // Wait for the entry to expire and a tick to run.
        tokio::time::sleep(Duration::from_millis(400)).await;

        // The entry is gone from the map itself, not just hidden from
        // reads.
        assert_eq!(cache.len().await, 0);

        handle.abort();
    }

    #[tokio::test]
    async fn test_compaction_task_preserves_valid_entries() {
        let cache = LocalCache::new(CacheOptions::default()).unwrap();

        cache
            .set(
                "long_lived",
                json!("value"),
                Some(Utc::now() + ChronoDuration::hours(1)),
            )
            .await
            .unwrap();

        let handle = spawn_compaction_task(cache.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(cache.contains("long_lived").await.unwrap());

        handle.abort();
    }

    #[tokio::test]
    async fn test_compaction_task_can_be_aborted() {
        let cache = LocalCache::new(CacheOptions::default()).unwrap();

        let handle = spawn_compaction_task(cache, Duration::from_millis(50));
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished());
    }
}
