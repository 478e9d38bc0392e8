//! Local Cache Handle Module
//!
//! Wraps the synchronous [`CacheEngine`] in a shared reader/writer lock
//! and exposes the asynchronous [`Cache`] contract. Every operation runs
//! its whole critical section under one lock acquisition, which is what
//! turns `add` into a single-winner primitive under concurrency.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::engine::{CacheEngine, CompactionReport};
use crate::cache::entry::ListItem;
use crate::cache::stats::CacheStats;
use crate::cache::Cache;
use crate::clock::Clock;
use crate::config::CacheOptions;
use crate::error::Result;
use crate::value::{CacheValue, Number};

// == Local Cache ==
/// Thread-safe handle to a bounded in-memory cache engine.
///
/// Cloning the handle shares the underlying engine.
#[derive(Debug, Clone)]
pub struct LocalCache {
    /// The engine guarded by one lock per instance
    inner: Arc<RwLock<CacheEngine>>,
    /// Whether serialization failures surface as errors
    strict_serialization: bool,
    /// Shared time source, kept for composing layers
    clock: Arc<dyn Clock>,
}

impl LocalCache {
    // == Constructor ==
    /// Creates a new local cache from the given options.
    ///
    /// Fails fast when the options are inconsistent (memory budget
    /// without an estimator).
    pub fn new(options: CacheOptions) -> Result<Self> {
        let strict_serialization = options.throw_on_serialization_error;
        let clock = Arc::clone(&options.clock);
        let engine = CacheEngine::new(options)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(engine)),
            strict_serialization,
            clock,
        })
    }

    /// Shared reference to the engine, for the background compaction task.
    pub fn engine(&self) -> Arc<RwLock<CacheEngine>> {
        Arc::clone(&self.inner)
    }

    /// The cache's time source.
    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Runs one compaction pass immediately.
    pub async fn compact(&self) -> CompactionReport {
        self.inner.write().await.compact()
    }

    /// Current number of entries.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Returns true when the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    // == Typed Convenience Layer ==
    /// Serializes `value` and stores it under `key`.
    ///
    /// A value that cannot be serialized either surfaces as
    /// [`crate::CacheError::Serialization`] or is silently dropped
    /// (returning `false`), per `throw_on_serialization_error`.
    pub async fn set_value<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                if self.strict_serialization {
                    return Err(err.into());
                }
                debug!(key, error = %err, "dropping unserializable value");
                return Ok(false);
            }
        };
        self.set(key, value, expires_at).await
    }

    /// Retrieves and deserializes the value under `key`.
    ///
    /// A stored value that does not deserialize into `T` either surfaces
    /// as an error or is treated as a miss, per
    /// `throw_on_serialization_error`.
    pub async fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let value = match self.get(key).await? {
            Some(value) => value,
            None => return Ok(None),
        };
        match serde_json::from_value((*value).clone()) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                if self.strict_serialization {
                    Err(err.into())
                } else {
                    debug!(key, error = %err, "stored value does not deserialize, treating as miss");
                    Ok(None)
                }
            }
        }
    }
}

// == Cache Contract ==
#[async_trait]
impl Cache for LocalCache {
    async fn get(&self, key: &str) -> Result<Option<Arc<CacheValue>>> {
        self.inner.write().await.get(key)
    }

    async fn set(
        &self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.inner.write().await.set(key, value, expires_at)
    }

    async fn add(
        &self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.inner.write().await.add(key, value, expires_at)
    }

    async fn replace(
        &self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.inner.write().await.replace(key, value, expires_at)
    }

    async fn replace_if_equal(
        &self,
        key: &str,
        expected: &CacheValue,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.inner
            .write()
            .await
            .replace_if_equal(key, expected, value, expires_at)
    }

    async fn remove_if_equal(&self, key: &str, expected: &CacheValue) -> Result<bool> {
        self.inner.write().await.remove_if_equal(key, expected)
    }

    async fn increment(
        &self,
        key: &str,
        amount: Number,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Number> {
        self.inner.write().await.increment(key, amount, expires_at)
    }

    async fn set_if_higher(
        &self,
        key: &str,
        candidate: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Arc<CacheValue>> {
        self.inner
            .write()
            .await
            .set_if_higher(key, candidate, expires_at)
    }

    async fn set_if_lower(
        &self,
        key: &str,
        candidate: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Arc<CacheValue>> {
        self.inner
            .write()
            .await
            .set_if_lower(key, candidate, expires_at)
    }

    async fn get_expiration(&self, key: &str) -> Result<Option<Duration>> {
        self.inner.write().await.get_expiration(key)
    }

    async fn set_expiration(&self, key: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        self.inner.write().await.set_expiration(key, expires_at)
    }

    async fn list_add(&self, key: &str, items: Vec<ListItem>) -> Result<usize> {
        self.inner.write().await.list_add(key, items)
    }

    async fn list_remove(&self, key: &str, values: &[CacheValue]) -> Result<usize> {
        self.inner.write().await.list_remove(key, values)
    }

    async fn get_list(&self, key: &str, page: usize, page_size: usize) -> Result<Vec<CacheValue>> {
        self.inner.write().await.get_list(key, page, page_size)
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        self.inner.read().await.contains(key)
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.inner.write().await.remove(key)
    }

    async fn remove_all(&self, keys: Option<&[String]>) -> Result<usize> {
        self.inner.write().await.remove_all(keys)
    }

    async fn remove_by_prefix(&self, prefix: &str) -> Result<usize> {
        self.inner.write().await.remove_by_prefix(prefix)
    }

    async fn get_all(&self, keys: &[String]) -> Result<HashMap<String, Option<Arc<CacheValue>>>> {
        self.inner.write().await.get_all(keys)
    }

    async fn stats(&self) -> Result<CacheStats> {
        Ok(self.inner.read().await.stats())
    }
}
