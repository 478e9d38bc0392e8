//! Scoped Cache Module
//!
//! A key-prefixing decorator: every key is rewritten to
//! `scope + separator + key` before delegating to the inner cache, so
//! one shared cache can isolate tenants or use cases from each other.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::cache::entry::ListItem;
use crate::cache::stats::CacheStats;
use crate::cache::Cache;
use crate::error::Result;
use crate::value::{CacheValue, Number};

/// Separator between the scope and the caller's key.
pub const SCOPE_SEPARATOR: &str = ":";

// == Scoped Cache ==
/// Decorator that namespaces every operation under a scope prefix.
///
/// Bulk operations stay inside the scope: `remove_by_prefix("")` removes
/// this scope's keys and nothing else, because the scope prefix is
/// always prepended before delegating.
pub struct ScopedCache {
    /// The cache being decorated
    inner: Arc<dyn Cache>,
    /// Scope prefix including the trailing separator
    prefix: String,
}

impl ScopedCache {
    /// Wraps `inner`, namespacing every key under `scope`.
    pub fn new(inner: Arc<dyn Cache>, scope: impl Into<String>) -> Self {
        let mut prefix = scope.into();
        prefix.push_str(SCOPE_SEPARATOR);
        Self { inner, prefix }
    }

    fn qualify(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn qualify_all(&self, keys: &[String]) -> Vec<String> {
        keys.iter().map(|key| self.qualify(key)).collect()
    }

    fn strip<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(&self.prefix).unwrap_or(key)
    }
}

// == Cache Contract ==
#[async_trait]
impl Cache for ScopedCache {
    async fn get(&self, key: &str) -> Result<Option<Arc<CacheValue>>> {
        self.inner.get(&self.qualify(key)).await
    }

    async fn set(
        &self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.inner.set(&self.qualify(key), value, expires_at).await
    }

    async fn add(
        &self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.inner.add(&self.qualify(key), value, expires_at).await
    }

    async fn replace(
        &self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.inner
            .replace(&self.qualify(key), value, expires_at)
            .await
    }

    async fn replace_if_equal(
        &self,
        key: &str,
        expected: &CacheValue,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.inner
            .replace_if_equal(&self.qualify(key), expected, value, expires_at)
            .await
    }

    async fn remove_if_equal(&self, key: &str, expected: &CacheValue) -> Result<bool> {
        self.inner
            .remove_if_equal(&self.qualify(key), expected)
            .await
    }

    async fn increment(
        &self,
        key: &str,
        amount: Number,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Number> {
        self.inner
            .increment(&self.qualify(key), amount, expires_at)
            .await
    }

    async fn set_if_higher(
        &self,
        key: &str,
        candidate: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Arc<CacheValue>> {
        self.inner
            .set_if_higher(&self.qualify(key), candidate, expires_at)
            .await
    }

    async fn set_if_lower(
        &self,
        key: &str,
        candidate: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Arc<CacheValue>> {
        self.inner
            .set_if_lower(&self.qualify(key), candidate, expires_at)
            .await
    }

    async fn get_expiration(&self, key: &str) -> Result<Option<Duration>> {
        self.inner.get_expiration(&self.qualify(key)).await
    }

    async fn set_expiration(&self, key: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        self.inner
            .set_expiration(&self.qualify(key), expires_at)
            .await
    }

    async fn list_add(&self, key: &str, items: Vec<ListItem>) -> Result<usize> {
        self.inner.list_add(&self.qualify(key), items).await
    }

    async fn list_remove(&self, key: &str, values: &[CacheValue]) -> Result<usize> {
        self.inner.list_remove(&self.qualify(key), values).await
    }

    async fn get_list(&self, key: &str, page: usize, page_size: usize) -> Result<Vec<CacheValue>> {
        self.inner
            .get_list(&self.qualify(key), page, page_size)
            .await
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        self.inner.contains(&self.qualify(key)).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.inner.remove(&self.qualify(key)).await
    }

    /// Clearing a scope clears only that scope: the no-keys form turns
    /// into a prefix removal under the scope prefix.
    async fn remove_all(&self, keys: Option<&[String]>) -> Result<usize> {
        match keys {
            None => self.inner.remove_by_prefix(&self.prefix).await,
            Some(keys) => {
                let qualified = self.qualify_all(keys);
                self.inner.remove_all(Some(&qualified)).await
            }
        }
    }

    async fn remove_by_prefix(&self, prefix: &str) -> Result<usize> {
        self.inner
            .remove_by_prefix(&format!("{}{}", self.prefix, prefix))
            .await
    }

    async fn get_all(&self, keys: &[String]) -> Result<HashMap<String, Option<Arc<CacheValue>>>> {
        let qualified = self.qualify_all(keys);
        let result = self.inner.get_all(&qualified).await?;
        Ok(result
            .into_iter()
            .map(|(key, value)| (self.strip(&key).to_string(), value))
            .collect())
    }

    /// Counters are kept by the inner cache and cover every scope.
    async fn stats(&self) -> Result<CacheStats> {
        self.inner.stats().await
    }
}
