//! Cache Engine Module
//!
//! The synchronous core of the local cache: one map of entries plus the
//! compaction algorithm that removes expired entries and evicts by
//! recency until the configured resource budgets hold. Thread safety is
//! layered on top by [`super::LocalCache`], which runs every operation
//! under a single write-lock acquisition.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::cache::entry::{CacheEntry, ListItem, StoredValue};
use crate::cache::size::SizeEstimator;
use crate::cache::stats::CacheStats;
use crate::cache::{fold_key, fold_prefix};
use crate::clock::Clock;
use crate::config::CacheOptions;
use crate::error::{CacheError, Result};
use crate::value::{as_comparable, as_number, CacheValue, Number};

// == Compaction Report ==
/// Outcome of one compaction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Entries removed because their TTL elapsed
    pub expired: usize,
    /// Entries evicted to satisfy a resource budget
    pub evicted: usize,
}

impl CompactionReport {
    /// True when the pass removed nothing.
    pub fn is_noop(&self) -> bool {
        self.expired == 0 && self.evicted == 0
    }
}

// == Effective Expiry ==
/// Normalized form of a caller-supplied expiration argument.
enum EffectiveExpiry {
    /// The instant is already past: the operation removes the key
    Remove,
    /// No expiration (explicit `MAX_UTC` or none supplied)
    Never,
    /// Expire at the given future instant
    At(DateTime<Utc>),
}

fn normalize_expiry(now: DateTime<Utc>, requested: Option<DateTime<Utc>>) -> EffectiveExpiry {
    match requested {
        None => EffectiveExpiry::Never,
        Some(at) if at == DateTime::<Utc>::MAX_UTC => EffectiveExpiry::Never,
        Some(at) if at <= now => EffectiveExpiry::Remove,
        Some(at) => EffectiveExpiry::At(at),
    }
}

// == Cache Engine ==
/// Bounded in-memory key/value store with expiration, atomic numeric and
/// list mutation, and deterministic eviction under entry-count and
/// memory budgets.
#[derive(Debug)]
pub struct CacheEngine {
    /// Key-value storage, keyed by case-folded key
    entries: HashMap<String, CacheEntry>,
    /// Performance statistics
    stats: CacheStats,
    /// Entry-count budget
    max_items: Option<usize>,
    /// Approximate memory budget in bytes
    max_memory_bytes: Option<usize>,
    /// Pluggable value sizing
    estimator: Option<Arc<dyn SizeEstimator>>,
    /// Deep-copy values on read instead of aliasing
    clone_values: bool,
    /// Time source
    clock: Arc<dyn Clock>,
}

impl CacheEngine {
    // == Constructor ==
    /// Creates a new engine from the given options.
    ///
    /// Fails fast with [`CacheError::Configuration`] when a memory budget
    /// is configured without a size estimator.
    pub fn new(options: CacheOptions) -> Result<Self> {
        if options.max_memory_bytes.is_some() && options.estimator.is_none() {
            return Err(CacheError::Configuration(
                "a memory budget requires a size estimator".to_string(),
            ));
        }
        Ok(Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
            max_items: options.max_items,
            max_memory_bytes: options.max_memory_bytes,
            estimator: options.estimator,
            clone_values: options.clone_values,
            clock: options.clock,
        })
    }

    // == Get ==
    /// Retrieves a value by key, updating recency and hit/miss counters.
    /// An expired entry is lazily removed and reported as a miss.
    pub fn get(&mut self, key: &str) -> Result<Option<Arc<CacheValue>>> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        self.purge_if_expired(&folded, now);

        match self.entries.get_mut(&folded) {
            Some(entry) => {
                entry.last_access = now;
                self.stats.record_hit();
                let value = match &entry.value {
                    StoredValue::Scalar(v) => {
                        if self.clone_values {
                            Arc::new((**v).clone())
                        } else {
                            Arc::clone(v)
                        }
                    }
                    StoredValue::List(items) => Arc::new(CacheValue::Array(
                        items
                            .iter()
                            .filter(|i| !i.is_expired(now))
                            .map(|i| i.value.clone())
                            .collect(),
                    )),
                };
                Ok(Some(value))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    // == Set ==
    /// Unconditional upsert. An expiration in the past removes the key
    /// instead of storing anything.
    pub fn set(
        &mut self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        match normalize_expiry(now, expires_at) {
            EffectiveExpiry::Remove => {
                self.remove_entry(&folded);
                Ok(true)
            }
            expiry => {
                let expires_at = match expiry {
                    EffectiveExpiry::At(at) => Some(at),
                    _ => None,
                };
                self.upsert(folded, StoredValue::Scalar(Arc::new(value)), expires_at, now);
                self.compact_at(now);
                Ok(true)
            }
        }
    }

    // == Add ==
    /// Inserts only when the key holds no live value. The existence check
    /// and the insert form one critical section, so of any number of
    /// concurrent callers racing on the same absent key exactly one wins.
    pub fn add(
        &mut self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        self.purge_if_expired(&folded, now);
        if self.entries.contains_key(&folded) {
            return Ok(false);
        }
        match normalize_expiry(now, expires_at) {
            // The entry would expire before it could be observed; the add
            // wins but nothing is stored.
            EffectiveExpiry::Remove => Ok(true),
            EffectiveExpiry::Never => {
                self.upsert(folded, StoredValue::Scalar(Arc::new(value)), None, now);
                self.compact_at(now);
                Ok(true)
            }
            EffectiveExpiry::At(at) => {
                self.upsert(folded, StoredValue::Scalar(Arc::new(value)), Some(at), now);
                self.compact_at(now);
                Ok(true)
            }
        }
    }

    // == Replace ==
    /// Overwrites only when the key holds a live value.
    pub fn replace(
        &mut self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        self.purge_if_expired(&folded, now);
        if !self.entries.contains_key(&folded) {
            return Ok(false);
        }
        match normalize_expiry(now, expires_at) {
            EffectiveExpiry::Remove => {
                self.remove_entry(&folded);
                Ok(true)
            }
            EffectiveExpiry::Never => {
                self.upsert(folded, StoredValue::Scalar(Arc::new(value)), None, now);
                self.compact_at(now);
                Ok(true)
            }
            EffectiveExpiry::At(at) => {
                self.upsert(folded, StoredValue::Scalar(Arc::new(value)), Some(at), now);
                self.compact_at(now);
                Ok(true)
            }
        }
    }

    // == Replace If Equal ==
    /// Overwrites only when the current value equals `expected`. No side
    /// effect on failure.
    pub fn replace_if_equal(
        &mut self,
        key: &str,
        expected: &CacheValue,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        self.purge_if_expired(&folded, now);
        if !self.current_equals(&folded, expected) {
            return Ok(false);
        }
        self.replace(key, value, expires_at)
    }

    // == Remove If Equal ==
    /// Removes only when the current value equals `expected`.
    pub fn remove_if_equal(&mut self, key: &str, expected: &CacheValue) -> Result<bool> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        self.purge_if_expired(&folded, now);
        if !self.current_equals(&folded, expected) {
            return Ok(false);
        }
        self.remove_entry(&folded);
        Ok(true)
    }

    // == Increment ==
    /// Adds `amount` to a numeric value, creating the key at `amount` if
    /// absent. A numeric-looking string is parsed and treated as numeric;
    /// any other existing value is a type mismatch.
    pub fn increment(
        &mut self,
        key: &str,
        amount: Number,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Number> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        self.purge_if_expired(&folded, now);

        let new_value = match self.entries.get(&folded) {
            None => amount,
            Some(entry) => match &entry.value {
                StoredValue::Scalar(v) => match as_number(v) {
                    Some(current) => current.add(amount),
                    None => {
                        return Err(CacheError::type_mismatch(
                            key,
                            "increment requires a numeric value",
                        ))
                    }
                },
                StoredValue::List(_) => {
                    return Err(CacheError::type_mismatch(
                        key,
                        "increment requires a numeric value, found a list",
                    ))
                }
            },
        };

        match normalize_expiry(now, expires_at) {
            EffectiveExpiry::Remove => {
                self.remove_entry(&folded);
            }
            EffectiveExpiry::Never => {
                // A plain increment must not clear an existing expiration.
                let keep = expires_at.is_none();
                let existing = if keep {
                    self.entries.get(&folded).and_then(|e| e.expires_at)
                } else {
                    None
                };
                self.upsert(
                    folded,
                    StoredValue::Scalar(Arc::new(new_value.to_value())),
                    existing,
                    now,
                );
                self.compact_at(now);
            }
            EffectiveExpiry::At(at) => {
                self.upsert(
                    folded,
                    StoredValue::Scalar(Arc::new(new_value.to_value())),
                    Some(at),
                    now,
                );
                self.compact_at(now);
            }
        }
        Ok(new_value)
    }

    // == Set If Higher / Set If Lower ==
    /// Stores `candidate` when the key is absent or holds a strictly
    /// lower value; returns the value now stored.
    pub fn set_if_higher(
        &mut self,
        key: &str,
        candidate: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Arc<CacheValue>> {
        self.set_if_ordered(key, candidate, expires_at, std::cmp::Ordering::Greater)
    }

    /// Stores `candidate` when the key is absent or holds a strictly
    /// higher value; returns the value now stored.
    pub fn set_if_lower(
        &mut self,
        key: &str,
        candidate: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Arc<CacheValue>> {
        self.set_if_ordered(key, candidate, expires_at, std::cmp::Ordering::Less)
    }

    fn set_if_ordered(
        &mut self,
        key: &str,
        candidate: CacheValue,
        expires_at: Option<DateTime<Utc>>,
        wanted: std::cmp::Ordering,
    ) -> Result<Arc<CacheValue>> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        self.purge_if_expired(&folded, now);

        let candidate_cmp = as_comparable(&candidate).ok_or_else(|| {
            CacheError::type_mismatch(key, "candidate is neither numeric nor a datetime")
        })?;

        let store = match self.entries.get_mut(&folded) {
            None => true,
            Some(entry) => {
                let current = match &entry.value {
                    StoredValue::Scalar(v) => as_comparable(v),
                    StoredValue::List(_) => None,
                };
                let current = current.ok_or_else(|| {
                    CacheError::type_mismatch(key, "stored value is neither numeric nor a datetime")
                })?;
                match candidate_cmp.partial_cmp(current) {
                    Some(ordering) if ordering == wanted => true,
                    Some(_) => {
                        // Candidate loses: this is a read of the current value.
                        entry.last_access = now;
                        false
                    }
                    None => {
                        return Err(CacheError::type_mismatch(
                            key,
                            "candidate and stored value are not comparable",
                        ))
                    }
                }
            }
        };

        if store {
            let stored = Arc::new(candidate);
            let expires_at = match normalize_expiry(now, expires_at) {
                EffectiveExpiry::Remove => {
                    // Store-and-expire degenerates to a removal; the
                    // candidate still is the effective value returned.
                    self.remove_entry(&folded);
                    return Ok(stored);
                }
                EffectiveExpiry::Never => None,
                EffectiveExpiry::At(at) => Some(at),
            };
            self.upsert(folded, StoredValue::Scalar(Arc::clone(&stored)), expires_at, now);
            self.compact_at(now);
            Ok(stored)
        } else {
            let entry = self.entries.get(&folded).expect("checked above");
            match &entry.value {
                StoredValue::Scalar(v) => Ok(self.maybe_clone(v)),
                StoredValue::List(_) => unreachable!("lists are rejected above"),
            }
        }
    }

    // == Expiration Accessors ==
    /// Remaining time until the key expires; `None` when absent or when
    /// the entry never expires.
    pub fn get_expiration(&mut self, key: &str) -> Result<Option<Duration>> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        self.purge_if_expired(&folded, now);
        Ok(self
            .entries
            .get(&folded)
            .and_then(|entry| entry.ttl_remaining(now)))
    }

    /// Re-schedules a key's expiration. An instant in the past removes
    /// the key; `MAX_UTC` clears the expiration.
    pub fn set_expiration(&mut self, key: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        self.purge_if_expired(&folded, now);
        if !self.entries.contains_key(&folded) {
            return Ok(false);
        }
        match normalize_expiry(now, Some(expires_at)) {
            EffectiveExpiry::Remove => {
                self.remove_entry(&folded);
            }
            EffectiveExpiry::Never => {
                let entry = self.entries.get_mut(&folded).expect("checked above");
                entry.expires_at = None;
                entry.last_modified = now;
            }
            EffectiveExpiry::At(at) => {
                let entry = self.entries.get_mut(&folded).expect("checked above");
                entry.expires_at = Some(at);
                entry.last_modified = now;
            }
        }
        Ok(true)
    }

    // == List Operations ==
    /// Merges scalar items into a list entry; duplicate values collapse
    /// to one, re-adding a value refreshes its per-item expiration.
    /// Returns the number of live items after the merge.
    pub fn list_add(&mut self, key: &str, items: Vec<ListItem>) -> Result<usize> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        self.purge_if_expired(&folded, now);

        for item in &items {
            if !crate::value::is_scalar(&item.value) {
                return Err(CacheError::type_mismatch(
                    key,
                    "list items must be scalar values",
                ));
            }
        }

        let mut entry = match self.entries.remove(&folded) {
            Some(entry) => {
                self.stats.memory_bytes = self.stats.memory_bytes.saturating_sub(entry.approx_size);
                match entry.value {
                    StoredValue::List(_) => entry,
                    StoredValue::Scalar(_) => {
                        // Put the scalar back untouched before failing.
                        let size = entry.approx_size;
                        self.stats.memory_bytes += size;
                        self.entries.insert(folded, entry);
                        self.stats.count = self.entries.len();
                        return Err(CacheError::type_mismatch(
                            key,
                            "cannot add list items to a scalar value",
                        ));
                    }
                }
            }
            None => CacheEntry::new(StoredValue::List(Vec::new()), None, now, 0),
        };

        if let StoredValue::List(list) = &mut entry.value {
            list.retain(|existing| !existing.is_expired(now));
            for item in items {
                if item.is_expired(now) {
                    continue;
                }
                match list.iter_mut().find(|existing| existing.value == item.value) {
                    Some(existing) => existing.expires_at = item.expires_at,
                    None => list.push(item),
                }
            }
        }

        let live = match &entry.value {
            StoredValue::List(list) => list.len(),
            StoredValue::Scalar(_) => unreachable!("entry is a list here"),
        };

        if live == 0 {
            // Nothing survived; do not keep an empty list entry around.
            self.stats.count = self.entries.len();
            return Ok(0);
        }

        entry.approx_size = self.value_size(&entry.value);
        entry.last_modified = now;
        entry.last_access = now;
        self.stats.memory_bytes += entry.approx_size;
        self.entries.insert(folded, entry);
        self.stats.count = self.entries.len();
        self.compact_at(now);
        Ok(live)
    }

    /// Removes items from a list entry by value; removing the last item
    /// removes the key entirely. Returns the number of items removed.
    pub fn list_remove(&mut self, key: &str, values: &[CacheValue]) -> Result<usize> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        self.purge_if_expired(&folded, now);

        let (removed, now_empty, old_size) = {
            let entry = match self.entries.get_mut(&folded) {
                None => return Ok(0),
                Some(entry) => entry,
            };
            let list = match &mut entry.value {
                StoredValue::List(list) => list,
                StoredValue::Scalar(_) => {
                    return Err(CacheError::type_mismatch(
                        key,
                        "cannot remove list items from a scalar value",
                    ))
                }
            };

            let before = list.len();
            list.retain(|item| !values.contains(&item.value));
            let removed = before - list.len();
            entry.last_modified = now;
            (removed, matches!(&entry.value, StoredValue::List(l) if l.is_empty()), entry.approx_size)
        };

        if now_empty {
            self.remove_entry(&folded);
        } else if removed > 0 {
            // Sizes shrink with the list; recompute from the live items.
            let value_snapshot = self.entries.get(&folded).expect("still present").value.clone();
            let new_size = self.value_size(&value_snapshot);
            let entry = self.entries.get_mut(&folded).expect("still present");
            entry.approx_size = new_size;
            self.stats.memory_bytes = self.stats.memory_bytes.saturating_sub(old_size) + new_size;
        }
        Ok(removed)
    }

    /// Returns one page of a list entry's live items. `page` is
    /// zero-based; a `page_size` of zero returns all items.
    pub fn get_list(&mut self, key: &str, page: usize, page_size: usize) -> Result<Vec<CacheValue>> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        self.purge_if_expired(&folded, now);

        let entry = match self.entries.get_mut(&folded) {
            None => {
                self.stats.record_miss();
                return Ok(Vec::new());
            }
            Some(entry) => entry,
        };
        let list = match &entry.value {
            StoredValue::List(list) => list,
            StoredValue::Scalar(_) => {
                return Err(CacheError::type_mismatch(key, "value is not a list"))
            }
        };

        entry.last_access = now;
        self.stats.record_hit();
        let live = list.iter().filter(|item| !item.is_expired(now));
        let items: Vec<CacheValue> = if page_size == 0 {
            live.map(|item| item.value.clone()).collect()
        } else {
            live.skip(page * page_size)
                .take(page_size)
                .map(|item| item.value.clone())
                .collect()
        };
        Ok(items)
    }

    // == Contains ==
    /// Non-mutating existence probe; never touches recency or counters.
    pub fn contains(&self, key: &str) -> Result<bool> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        Ok(self
            .entries
            .get(&folded)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false))
    }

    // == Remove ==
    /// Removes a key. Returns whether it was present and live.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        let folded = fold_key(key)?;
        let now = self.clock.now();
        self.purge_if_expired(&folded, now);
        Ok(self.remove_entry(&folded).is_some())
    }

    // == Remove All ==
    /// Removes the given keys, or clears the whole cache (counters
    /// included) when `keys` is `None`. Returns the number removed.
    pub fn remove_all(&mut self, keys: Option<&[String]>) -> Result<usize> {
        match keys {
            None => {
                let removed = self.entries.len();
                self.entries.clear();
                // A full clear is the one operation that resets counters.
                self.stats = CacheStats::new();
                Ok(removed)
            }
            Some(keys) => {
                let mut removed = 0;
                for key in keys {
                    let folded = fold_key(key)?;
                    if self.remove_entry(&folded).is_some() {
                        removed += 1;
                    }
                }
                Ok(removed)
            }
        }
    }

    // == Remove By Prefix ==
    /// Removes every key starting with `prefix`, matched literally; `*`
    /// has no wildcard meaning. An empty prefix matches everything.
    pub fn remove_by_prefix(&mut self, prefix: &str) -> Result<usize> {
        let folded_prefix = fold_prefix(prefix);
        let matching: Vec<String> = self
            .entries
            .keys()
            .filter(|k| k.starts_with(&folded_prefix))
            .cloned()
            .collect();
        let removed = matching.len();
        for key in matching {
            self.remove_entry(&key);
        }
        Ok(removed)
    }

    // == Get All ==
    /// Batch read; each requested key resolves independently with the
    /// same semantics as [`get`](Self::get).
    pub fn get_all(&mut self, keys: &[String]) -> Result<HashMap<String, Option<Arc<CacheValue>>>> {
        let mut result = HashMap::with_capacity(keys.len());
        for key in keys {
            let value = self.get(key)?;
            result.insert(key.clone(), value);
        }
        Ok(result)
    }

    // == Stats ==
    /// Returns a snapshot of the current counters.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.count = self.entries.len();
        stats
    }

    // == Length ==
    /// Current number of entries, expired-but-not-yet-purged included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Compaction ==
    /// Runs one maintenance pass: drop every expired entry (and expired
    /// list items), then evict by oldest `last_access` (ties broken by
    /// oldest `last_modified`, then key) until both budgets hold.
    pub fn compact(&mut self) -> CompactionReport {
        let now = self.clock.now();
        self.compact_at(now)
    }

    fn compact_at(&mut self, now: DateTime<Utc>) -> CompactionReport {
        let mut report = CompactionReport::default();

        // Phase 1: expiration, never subject to budget checks.
        let keys: Vec<String> = self.entries.keys().cloned().collect();
        for key in keys {
            let entry = self.entries.get(&key).expect("key collected above");
            if entry.is_expired(now) {
                self.remove_entry(&key);
                self.stats.record_expiration();
                report.expired += 1;
                continue;
            }
            if let StoredValue::List(items) = &entry.value {
                if items.iter().any(|item| item.is_expired(now)) {
                    let mut entry = self.entries.remove(&key).expect("key collected above");
                    self.stats.memory_bytes =
                        self.stats.memory_bytes.saturating_sub(entry.approx_size);
                    if let StoredValue::List(items) = &mut entry.value {
                        items.retain(|item| !item.is_expired(now));
                    }
                    let empty = matches!(&entry.value, StoredValue::List(items) if items.is_empty());
                    if empty {
                        self.stats.record_expiration();
                        report.expired += 1;
                    } else {
                        entry.approx_size = self.value_size(&entry.value);
                        self.stats.memory_bytes += entry.approx_size;
                        self.entries.insert(key, entry);
                    }
                }
            }
        }
        self.stats.count = self.entries.len();

        // Phase 2: eviction, one entry at a time, oldest access first.
        if self.over_budget() {
            let mut order: Vec<(DateTime<Utc>, DateTime<Utc>, String)> = self
                .entries
                .iter()
                .map(|(k, e)| (e.last_access, e.last_modified, k.clone()))
                .collect();
            order.sort();
            for (_, _, key) in order {
                if !self.over_budget() {
                    break;
                }
                self.remove_entry(&key);
                self.stats.record_eviction();
                report.evicted += 1;
            }
        }

        if !report.is_noop() {
            debug!(
                expired = report.expired,
                evicted = report.evicted,
                count = self.entries.len(),
                memory_bytes = self.stats.memory_bytes,
                "compaction pass finished"
            );
        }
        report
    }

    // == Internal Helpers ==
    /// True while either budget is exceeded.
    fn over_budget(&self) -> bool {
        if let Some(max) = self.max_items {
            if self.entries.len() > max {
                return true;
            }
        }
        if let Some(max) = self.max_memory_bytes {
            if self.stats.memory_bytes > max {
                return true;
            }
        }
        false
    }

    /// Approximate size of a stored value; zero without an estimator.
    fn value_size(&self, value: &StoredValue) -> usize {
        let estimator = match &self.estimator {
            Some(estimator) => estimator,
            None => return 0,
        };
        match value {
            StoredValue::Scalar(v) => estimator.estimate(v),
            StoredValue::List(items) => items
                .iter()
                .map(|item| estimator.estimate(&item.value))
                .sum(),
        }
    }

    /// Lazily drops the entry when its TTL has elapsed.
    fn purge_if_expired(&mut self, folded: &str, now: DateTime<Utc>) {
        let expired = self
            .entries
            .get(folded)
            .map(|entry| entry.is_expired(now))
            .unwrap_or(false);
        if expired {
            self.remove_entry(folded);
            self.stats.record_expiration();
        }
    }

    /// Inserts or overwrites an entry, keeping the memory counter
    /// incremental: add on insert, subtract-old-add-new on update.
    fn upsert(
        &mut self,
        folded: String,
        value: StoredValue,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        let size = self.value_size(&value);
        match self.entries.get_mut(&folded) {
            Some(entry) => {
                self.stats.memory_bytes =
                    self.stats.memory_bytes.saturating_sub(entry.approx_size) + size;
                entry.value = value;
                entry.expires_at = expires_at;
                entry.last_modified = now;
                entry.last_access = now;
                entry.approx_size = size;
            }
            None => {
                self.stats.memory_bytes += size;
                self.entries
                    .insert(folded, CacheEntry::new(value, expires_at, now, size));
            }
        }
        self.stats.count = self.entries.len();
    }

    /// Removes an entry and subtracts its size from the memory counter.
    fn remove_entry(&mut self, folded: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(folded);
        if let Some(entry) = &entry {
            self.stats.memory_bytes = self.stats.memory_bytes.saturating_sub(entry.approx_size);
        }
        self.stats.count = self.entries.len();
        entry
    }

    /// Compares the stored scalar value against `expected`. Lists never
    /// compare equal to a single value.
    fn current_equals(&self, folded: &str, expected: &CacheValue) -> bool {
        match self.entries.get(folded).map(|entry| &entry.value) {
            Some(StoredValue::Scalar(v)) => v.as_ref() == expected,
            _ => false,
        }
    }

    /// Applies the clone-values policy to a stored scalar.
    fn maybe_clone(&self, value: &Arc<CacheValue>) -> Arc<CacheValue> {
        if self.clone_values {
            Arc::new((**value).clone())
        } else {
            Arc::clone(value)
        }
    }
}
