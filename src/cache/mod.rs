//! Cache Module
//!
//! The local cache engine (expiration, atomic mutation, budget-driven
//! eviction) and the uniform asynchronous operation contract shared by
//! every cache in this crate: the local engine, the hybrid coordinator,
//! the scoped wrapper, and any distributed backend composed with them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::{CacheError, Result};
use crate::value::{CacheValue, Number};

pub mod engine;
pub mod entry;
pub mod local;
pub mod size;
pub mod stats;


// Re-export public types
pub use engine::{CacheEngine, CompactionReport};
pub use entry::{CacheEntry, ListItem, StoredValue};
pub use local::LocalCache;
pub use size::{FixedEstimator, SizeEstimator, StructuralEstimator};
pub use stats::CacheStats;

// == Key Handling ==
/// Keys compare case-insensitively. Folds a caller-supplied key into its
/// canonical form, rejecting empty keys.
pub(crate) fn fold_key(key: &str) -> Result<String> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must be non-empty".to_string()));
    }
    Ok(key.to_lowercase())
}

/// Folds a prefix without the non-empty requirement; an empty prefix
/// matches every key.
pub(crate) fn fold_prefix(prefix: &str) -> String {
    prefix.to_lowercase()
}

// == Cache Trait ==
/// The uniform operation contract.
///
/// A distributed backend implements this trait so the hybrid coordinator
/// can compose it with a local mirror; the scoped wrapper decorates any
/// implementation with a key-prefix namespace.
///
/// Expiration arguments follow one convention everywhere: `None` (and
/// `DateTime::<Utc>::MAX_UTC`) mean "never expires"; an instant in the
/// past (including `MIN_UTC`) removes the key immediately.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Retrieves a value. Expired entries are lazily removed and count as
    /// misses. List entries are returned as an array snapshot of their
    /// live items.
    async fn get(&self, key: &str) -> Result<Option<Arc<CacheValue>>>;

    /// Unconditional upsert.
    async fn set(
        &self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Inserts only if the key holds no live value. Exactly one of any
    /// set of concurrent callers racing on the same absent key succeeds.
    async fn add(
        &self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Overwrites only if the key holds a live value.
    async fn replace(
        &self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Overwrites only if the current value equals `expected`.
    async fn replace_if_equal(
        &self,
        key: &str,
        expected: &CacheValue,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Removes only if the current value equals `expected`.
    async fn remove_if_equal(&self, key: &str, expected: &CacheValue) -> Result<bool>;

    /// Adds `amount` to a numeric value, creating the key at `amount` if
    /// absent. Numeric-looking strings are parsed; anything else is a
    /// type mismatch.
    async fn increment(
        &self,
        key: &str,
        amount: Number,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Number>;

    /// Stores `candidate` if the key is absent or holds a strictly lower
    /// value (numeric or datetime compare); returns the value now stored.
    async fn set_if_higher(
        &self,
        key: &str,
        candidate: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Arc<CacheValue>>;

    /// Stores `candidate` if the key is absent or holds a strictly higher
    /// value; returns the value now stored.
    async fn set_if_lower(
        &self,
        key: &str,
        candidate: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Arc<CacheValue>>;

    /// Returns the remaining time until the key expires, or `None` when
    /// the key is absent or never expires.
    async fn get_expiration(&self, key: &str) -> Result<Option<Duration>>;

    /// Re-schedules a key's expiration. An instant in the past removes
    /// the key; `MAX_UTC` clears the expiration. Returns whether the key
    /// was present.
    async fn set_expiration(&self, key: &str, expires_at: DateTime<Utc>) -> Result<bool>;

    /// Merges scalar items into a list entry (duplicate values collapse
    /// to one). Returns the number of live items after the merge.
    async fn list_add(&self, key: &str, items: Vec<ListItem>) -> Result<usize>;

    /// Removes items from a list entry by value. Removing the last item
    /// removes the key. Returns the number of items removed.
    async fn list_remove(&self, key: &str, values: &[CacheValue]) -> Result<usize>;

    /// Returns one page of a list entry's live items. `page` is
    /// zero-based; a `page_size` of zero returns everything.
    async fn get_list(&self, key: &str, page: usize, page_size: usize) -> Result<Vec<CacheValue>>;

    /// Non-mutating existence probe; does not touch recency or counters.
    async fn contains(&self, key: &str) -> Result<bool>;

    /// Removes a key. Returns whether it was present.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Removes the given keys, or everything when `keys` is `None`.
    /// Returns the number of entries removed.
    async fn remove_all(&self, keys: Option<&[String]>) -> Result<usize>;

    /// Removes every key starting with `prefix`, matched literally
    /// (`*` is just a character, not a wildcard). An empty prefix matches
    /// everything. Returns the number of entries removed.
    async fn remove_by_prefix(&self, prefix: &str) -> Result<usize>;

    /// Batch read with the same lazy-expiration semantics as [`get`].
    /// The result maps each requested key to its outcome.
    ///
    /// [`get`]: Cache::get
    async fn get_all(&self, keys: &[String]) -> Result<HashMap<String, Option<Arc<CacheValue>>>>;

    /// Returns a snapshot of the cache's counters.
    async fn stats(&self) -> Result<CacheStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_key_rejects_empty() {
        assert!(matches!(fold_key(""), Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn test_fold_key_is_case_insensitive() {
        assert_eq!(fold_key("Counter").unwrap(), fold_key("COUNTER").unwrap());
    }

    #[test]
    fn test_fold_prefix_allows_empty() {
        assert_eq!(fold_prefix(""), "");
        assert_eq!(fold_prefix("Tenant1:"), "tenant1:");
    }
}
