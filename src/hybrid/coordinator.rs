//! Hybrid Cache Coordinator Module
//!
//! Layers a private bounded local mirror on top of a distributed cache
//! and keeps the mirror coherent with sibling instances through
//! broadcast invalidation. The distributed tier is the source of truth:
//! every mutation lands there first, then an invalidation is published,
//! then the key is evicted from the mirror so the next read repopulates.
//!
//! Failure semantics: a failed or timed-out remote write publishes
//! nothing and leaves the mirror untouched. A failed publish after the
//! remote write succeeded still evicts locally; siblings keep serving
//! their mirrored copy until its TTL lapses. That bounded-staleness
//! window is an accepted property of the two-step write-then-publish
//! protocol, which is deliberately not transactional.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::entry::ListItem;
use crate::cache::local::LocalCache;
use crate::cache::stats::CacheStats;
use crate::cache::Cache;
use crate::clock::Clock;
use crate::config::HybridOptions;
use crate::error::{CacheError, Result};
use crate::hybrid::bus::{BusSubscription, MessageBus};
use crate::hybrid::message::{InvalidationAction, InvalidationMessage};
use crate::value::{CacheValue, Number};

// == Hybrid Cache ==
/// Two-tier cache: a distributed backend plus a private local mirror,
/// kept coherent across instances by broadcast invalidation.
pub struct HybridCache {
    /// The distributed tier, source of truth
    remote: Arc<dyn Cache>,
    /// Private bounded mirror; never shared between instances
    local: LocalCache,
    /// Invalidation transport shared by the fleet
    bus: Arc<dyn MessageBus>,
    /// Topic the fleet broadcasts invalidations on
    topic: String,
    /// This instance's identity, used to drop its own echoes
    origin_id: String,
    /// TTL stamped on mirrored values
    mirror_ttl: Option<StdDuration>,
    /// Deadline for calls into the distributed tier
    remote_timeout: Option<StdDuration>,
    /// Background task applying foreign invalidations to the mirror
    subscriber: JoinHandle<()>,
}

impl HybridCache {
    // == Constructor ==
    /// Connects a coordinator: builds the mirror, subscribes to the
    /// invalidation topic and starts the subscriber task.
    pub async fn connect(
        remote: Arc<dyn Cache>,
        bus: Arc<dyn MessageBus>,
        options: HybridOptions,
    ) -> Result<Self> {
        let local = LocalCache::new(options.mirror)?;
        let subscription = bus.subscribe(&options.topic).await?;
        let subscriber = tokio::spawn(run_subscriber(
            subscription,
            local.clone(),
            options.origin_id.clone(),
        ));
        info!(
            topic = %options.topic,
            origin_id = %options.origin_id,
            "hybrid cache connected"
        );
        Ok(Self {
            remote,
            local,
            bus,
            topic: options.topic,
            origin_id: options.origin_id,
            mirror_ttl: options.mirror_ttl,
            remote_timeout: options.remote_timeout,
            subscriber,
        })
    }

    /// This instance's identity on the invalidation topic.
    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    /// Handle to the private mirror, e.g. for a background compaction
    /// task.
    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    // == Internal Helpers ==
    /// Applies the configured deadline to a call into the distributed
    /// tier. A timeout surfaces before anything else happens, so neither
    /// an invalidation nor a mirror mutation can follow it.
    async fn remote_call<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.remote_timeout {
            Some(deadline) => tokio::time::timeout(deadline, call)
                .await
                .map_err(|_| CacheError::Backend("distributed cache call timed out".to_string()))?,
            None => call.await,
        }
    }

    /// Publishes an invalidation for the given action. A publish failure
    /// is logged, not surfaced: the remote write already succeeded, and
    /// siblings recover once their mirrored values expire.
    async fn publish(&self, action: InvalidationAction) {
        let message = InvalidationMessage {
            origin_id: self.origin_id.clone(),
            action,
        };
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to encode invalidation");
                return;
            }
        };
        if let Err(err) = self.bus.publish(&self.topic, payload).await {
            warn!(
                error = %err,
                topic = %self.topic,
                "failed to publish invalidation; sibling mirrors stay stale until TTL"
            );
        }
    }

    /// Publishes a single-key invalidation and evicts the key from the
    /// mirror. Runs only after a successful remote mutation.
    async fn invalidate_key(&self, key: &str) -> Result<()> {
        self.publish(InvalidationAction::RemoveKeys {
            keys: vec![key.to_string()],
        })
        .await;
        self.local.remove(key).await?;
        Ok(())
    }

    /// Expiration stamped on values populated into the mirror.
    fn mirror_expiry(&self) -> Option<DateTime<Utc>> {
        self.mirror_ttl.map(|ttl| {
            let ttl = Duration::from_std(ttl).unwrap_or(Duration::MAX);
            self.local
                .clock()
                .now()
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }
}

impl Drop for HybridCache {
    fn drop(&mut self) {
        self.subscriber.abort();
    }
}

// == Invalidation Subscriber ==
/// Consumes the invalidation topic and applies foreign messages to the
/// mirror. Messages stamped with this instance's own origin id are
/// echoes of mutations already applied locally; re-processing them
/// would start a feedback loop, so they are dropped.
async fn run_subscriber(mut subscription: BusSubscription, local: LocalCache, origin_id: String) {
    while let Some(payload) = subscription.recv().await {
        let message = match InvalidationMessage::decode(&payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "dropping malformed invalidation");
                continue;
            }
        };
        if message.origin_id == origin_id {
            debug!("ignoring own invalidation echo");
            continue;
        }
        apply_invalidation(&local, message).await;
    }
    debug!("invalidation subscription closed");
}

/// Evicts whatever a foreign invalidation names. Eviction is idempotent,
/// so duplicate delivery is harmless.
async fn apply_invalidation(local: &LocalCache, message: InvalidationMessage) {
    match message.action {
        InvalidationAction::RemoveKeys { keys } => {
            for key in keys {
                if let Err(err) = local.remove(&key).await {
                    warn!(key = %key, error = %err, "failed to apply invalidation");
                }
            }
        }
        InvalidationAction::RemoveByPrefix { prefix } => {
            if let Err(err) = local.remove_by_prefix(&prefix).await {
                warn!(prefix = %prefix, error = %err, "failed to apply invalidation");
            }
        }
        InvalidationAction::RemoveAll => {
            if let Err(err) = local.remove_all(None).await {
                warn!(error = %err, "failed to apply invalidation");
            }
        }
    }
}

// == Cache Contract ==
#[async_trait]
impl Cache for HybridCache {
    /// Read path: mirror first, distributed tier on miss, repopulating
    /// the mirror (subject to its own budget and TTL) on the way back.
    async fn get(&self, key: &str) -> Result<Option<Arc<CacheValue>>> {
        if let Some(value) = self.local.get(key).await? {
            return Ok(Some(value));
        }
        let value = self.remote_call(self.remote.get(key)).await?;
        if let Some(value) = &value {
            self.local
                .set(key, (**value).clone(), self.mirror_expiry())
                .await?;
        }
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let applied = self
            .remote_call(self.remote.set(key, value, expires_at))
            .await?;
        self.invalidate_key(key).await?;
        Ok(applied)
    }

    async fn add(
        &self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let applied = self
            .remote_call(self.remote.add(key, value, expires_at))
            .await?;
        if applied {
            self.invalidate_key(key).await?;
        }
        Ok(applied)
    }

    async fn replace(
        &self,
        key: &str,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let applied = self
            .remote_call(self.remote.replace(key, value, expires_at))
            .await?;
        if applied {
            self.invalidate_key(key).await?;
        }
        Ok(applied)
    }

    async fn replace_if_equal(
        &self,
        key: &str,
        expected: &CacheValue,
        value: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let applied = self
            .remote_call(self.remote.replace_if_equal(key, expected, value, expires_at))
            .await?;
        if applied {
            self.invalidate_key(key).await?;
        }
        Ok(applied)
    }

    async fn remove_if_equal(&self, key: &str, expected: &CacheValue) -> Result<bool> {
        let applied = self
            .remote_call(self.remote.remove_if_equal(key, expected))
            .await?;
        if applied {
            self.invalidate_key(key).await?;
        }
        Ok(applied)
    }

    async fn increment(
        &self,
        key: &str,
        amount: Number,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Number> {
        let value = self
            .remote_call(self.remote.increment(key, amount, expires_at))
            .await?;
        self.invalidate_key(key).await?;
        Ok(value)
    }

    async fn set_if_higher(
        &self,
        key: &str,
        candidate: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Arc<CacheValue>> {
        let value = self
            .remote_call(self.remote.set_if_higher(key, candidate, expires_at))
            .await?;
        self.invalidate_key(key).await?;
        Ok(value)
    }

    async fn set_if_lower(
        &self,
        key: &str,
        candidate: CacheValue,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Arc<CacheValue>> {
        let value = self
            .remote_call(self.remote.set_if_lower(key, candidate, expires_at))
            .await?;
        self.invalidate_key(key).await?;
        Ok(value)
    }

    /// Expiration is owned by the distributed tier; the mirror's own TTL
    /// is a private bound, not the answer.
    async fn get_expiration(&self, key: &str) -> Result<Option<Duration>> {
        self.remote_call(self.remote.get_expiration(key)).await
    }

    async fn set_expiration(&self, key: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        let applied = self
            .remote_call(self.remote.set_expiration(key, expires_at))
            .await?;
        if applied {
            self.invalidate_key(key).await?;
        }
        Ok(applied)
    }

    async fn list_add(&self, key: &str, items: Vec<ListItem>) -> Result<usize> {
        let live = self.remote_call(self.remote.list_add(key, items)).await?;
        self.invalidate_key(key).await?;
        Ok(live)
    }

    async fn list_remove(&self, key: &str, values: &[CacheValue]) -> Result<usize> {
        let removed = self
            .remote_call(self.remote.list_remove(key, values))
            .await?;
        if removed > 0 {
            self.invalidate_key(key).await?;
        }
        Ok(removed)
    }

    /// List pages come straight from the distributed tier: the mirror
    /// holds array snapshots, not list entries, so paging it would lie.
    async fn get_list(&self, key: &str, page: usize, page_size: usize) -> Result<Vec<CacheValue>> {
        self.remote_call(self.remote.get_list(key, page, page_size))
            .await
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        if self.local.contains(key).await? {
            return Ok(true);
        }
        self.remote_call(self.remote.contains(key)).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let removed = self.remote_call(self.remote.remove(key)).await?;
        if removed {
            self.invalidate_key(key).await?;
        } else {
            // The distributed tier never had it; the mirror must not
            // keep a value the source of truth lacks.
            self.local.remove(key).await?;
        }
        Ok(removed)
    }

    async fn remove_all(&self, keys: Option<&[String]>) -> Result<usize> {
        let removed = self.remote_call(self.remote.remove_all(keys)).await?;
        match keys {
            None => {
                self.publish(InvalidationAction::RemoveAll).await;
                self.local.remove_all(None).await?;
            }
            Some(keys) => {
                self.publish(InvalidationAction::RemoveKeys {
                    keys: keys.to_vec(),
                })
                .await;
                self.local.remove_all(Some(keys)).await?;
            }
        }
        Ok(removed)
    }

    async fn remove_by_prefix(&self, prefix: &str) -> Result<usize> {
        let removed = self
            .remote_call(self.remote.remove_by_prefix(prefix))
            .await?;
        self.publish(InvalidationAction::RemoveByPrefix {
            prefix: prefix.to_string(),
        })
        .await;
        self.local.remove_by_prefix(prefix).await?;
        Ok(removed)
    }

    async fn get_all(&self, keys: &[String]) -> Result<HashMap<String, Option<Arc<CacheValue>>>> {
        let mut result = self.local.get_all(keys).await?;
        let missing: Vec<String> = result
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(key, _)| key.clone())
            .collect();
        if missing.is_empty() {
            return Ok(result);
        }

        let fetched = self.remote_call(self.remote.get_all(&missing)).await?;
        for (key, value) in fetched {
            if let Some(value) = &value {
                self.local
                    .set(&key, (**value).clone(), self.mirror_expiry())
                    .await?;
            }
            result.insert(key, value);
        }
        Ok(result)
    }

    /// Counters of the private mirror; the distributed tier keeps its
    /// own.
    async fn stats(&self) -> Result<CacheStats> {
        self.local.stats().await
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheOptions;
    use crate::hybrid::bus::{FailingBus, InProcessBus};
    use serde_json::json;

    async fn coordinator(
        remote: Arc<dyn Cache>,
        bus: Arc<dyn MessageBus>,
        origin: &str,
    ) -> HybridCache {
        HybridCache::connect(
            remote,
            bus,
            HybridOptions::default().with_origin_id(origin),
        )
        .await
        .unwrap()
    }

    fn remote_double() -> Arc<dyn Cache> {
        Arc::new(LocalCache::new(CacheOptions::default()).unwrap())
    }

    #[tokio::test]
    async fn test_read_through_populates_mirror() {
        let remote = remote_double();
        let bus: Arc<dyn MessageBus> = Arc::new(InProcessBus::new());
        let hybrid = coordinator(Arc::clone(&remote), bus, "a").await;

        remote.set("k", json!("v"), None).await.unwrap();

        // First read misses the mirror and falls through.
        assert_eq!(*hybrid.get("k").await.unwrap().unwrap(), json!("v"));
        // Now the mirror holds it.
        assert!(hybrid.local().contains("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_mirror_hit_skips_remote() {
        let remote = remote_double();
        let bus: Arc<dyn MessageBus> = Arc::new(InProcessBus::new());
        let hybrid = coordinator(Arc::clone(&remote), bus, "a").await;

        remote.set("k", json!("v1"), None).await.unwrap();
        hybrid.get("k").await.unwrap();

        // Mutate the remote behind the mirror's back; the mirror still
        // answers with its copy.
        remote.set("k", json!("v2"), None).await.unwrap();
        assert_eq!(*hybrid.get("k").await.unwrap().unwrap(), json!("v1"));
    }

    #[tokio::test]
    async fn test_write_goes_to_remote_and_evicts_mirror() {
        let remote = remote_double();
        let bus: Arc<dyn MessageBus> = Arc::new(InProcessBus::new());
        let hybrid = coordinator(Arc::clone(&remote), bus, "a").await;

        hybrid.set("k", json!("v1"), None).await.unwrap();
        assert_eq!(*remote.get("k").await.unwrap().unwrap(), json!("v1"));

        // Prime the mirror, then overwrite; the mirror copy must go.
        hybrid.get("k").await.unwrap();
        hybrid.set("k", json!("v2"), None).await.unwrap();
        assert!(!hybrid.local().contains("k").await.unwrap());
        assert_eq!(*hybrid.get("k").await.unwrap().unwrap(), json!("v2"));
    }

    #[tokio::test]
    async fn test_failed_remote_write_leaves_mirror_alone() {
        let remote = remote_double();
        let bus: Arc<dyn MessageBus> = Arc::new(InProcessBus::new());
        let hybrid = coordinator(Arc::clone(&remote), bus, "a").await;

        remote.set("k", json!("v"), None).await.unwrap();
        hybrid.get("k").await.unwrap();

        // An invalid operation against the remote (increment on a
        // non-numeric value) fails; the mirrored copy must survive.
        assert!(hybrid
            .increment("k", Number::Int(1), None)
            .await
            .is_err());
        assert!(hybrid.local().contains("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_publish_failure_still_applies_locally() {
        let remote = remote_double();
        let bus: Arc<dyn MessageBus> = Arc::new(FailingBus);
        let hybrid = coordinator(Arc::clone(&remote), bus, "a").await;

        remote.set("k", json!("old"), None).await.unwrap();
        hybrid.get("k").await.unwrap();

        // The bus refuses the invalidation, but the write succeeded
        // against the remote, so this instance still converges.
        hybrid.set("k", json!("new"), None).await.unwrap();
        assert_eq!(*remote.get("k").await.unwrap().unwrap(), json!("new"));
        assert_eq!(*hybrid.get("k").await.unwrap().unwrap(), json!("new"));
    }

    #[tokio::test]
    async fn test_add_losing_race_does_not_invalidate() {
        let remote = remote_double();
        let bus: Arc<dyn MessageBus> = Arc::new(InProcessBus::new());
        let hybrid = coordinator(Arc::clone(&remote), bus, "a").await;

        remote.set("k", json!("held"), None).await.unwrap();
        hybrid.get("k").await.unwrap();

        assert!(!hybrid.add("k", json!("mine"), None).await.unwrap());
        // The losing add changed nothing, so the mirror keeps its copy.
        assert!(hybrid.local().contains("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_by_prefix_clears_mirror_scope() {
        let remote = remote_double();
        let bus: Arc<dyn MessageBus> = Arc::new(InProcessBus::new());
        let hybrid = coordinator(Arc::clone(&remote), bus, "a").await;

        hybrid.set("t1:a", json!(1), None).await.unwrap();
        hybrid.set("t1:b", json!(2), None).await.unwrap();
        hybrid.set("t2:a", json!(3), None).await.unwrap();
        hybrid.get("t1:a").await.unwrap();
        hybrid.get("t2:a").await.unwrap();

        let removed = hybrid.remove_by_prefix("t1:").await.unwrap();
        assert_eq!(removed, 2);
        assert!(!hybrid.local().contains("t1:a").await.unwrap());
        assert!(hybrid.local().contains("t2:a").await.unwrap());
        assert!(hybrid.get("t1:a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_all_merges_tiers() {
        let remote = remote_double();
        let bus: Arc<dyn MessageBus> = Arc::new(InProcessBus::new());
        let hybrid = coordinator(Arc::clone(&remote), bus, "a").await;

        hybrid.set("a", json!(1), None).await.unwrap();
        hybrid.get("a").await.unwrap(); // mirrored
        remote.set("b", json!(2), None).await.unwrap(); // remote only

        let result = hybrid
            .get_all(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(*result["a"].as_ref().unwrap().as_ref(), json!(1));
        assert_eq!(*result["b"].as_ref().unwrap().as_ref(), json!(2));
        assert!(result["c"].is_none());
        // The remote-only key is now mirrored too.
        assert!(hybrid.local().contains("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_sibling_invalidation_evicts_mirror() {
        let remote = remote_double();
        let bus = Arc::new(InProcessBus::new());
        let a = coordinator(Arc::clone(&remote), bus.clone() as Arc<dyn MessageBus>, "a").await;
        let b = coordinator(Arc::clone(&remote), bus.clone() as Arc<dyn MessageBus>, "b").await;

        a.set("x", json!("v1"), None).await.unwrap();
        // B mirrors the value.
        assert_eq!(*b.get("x").await.unwrap().unwrap(), json!("v1"));
        assert!(b.local().contains("x").await.unwrap());

        // A overwrites; B's mirror must be evicted by the broadcast.
        a.set("x", json!("v2"), None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(!b.local().contains("x").await.unwrap());
        assert_eq!(*b.get("x").await.unwrap().unwrap(), json!("v2"));
    }

    #[tokio::test]
    async fn test_own_invalidation_echo_is_ignored() {
        let remote = remote_double();
        let bus = Arc::new(InProcessBus::new());
        let a = coordinator(Arc::clone(&remote), bus as Arc<dyn MessageBus>, "a").await;

        a.set("x", json!("v"), None).await.unwrap();
        // Repopulate the mirror after the write's own eviction.
        a.get("x").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // The echo of A's own invalidation must not evict the value A
        // just repopulated.
        assert!(a.local().contains("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_remote_timeout_surfaces_and_mutates_nothing() {
        /// A remote whose writes hang forever.
        struct StalledRemote(LocalCache);

        #[async_trait]
        impl Cache for StalledRemote {
            async fn get(&self, key: &str) -> Result<Option<Arc<CacheValue>>> {
                self.0.get(key).await
            }
            async fn set(
                &self,
                _key: &str,
                _value: CacheValue,
                _expires_at: Option<DateTime<Utc>>,
            ) -> Result<bool> {
                std::future::pending().await
            }
            async fn add(
                &self,
                key: &str,
                value: CacheValue,
                expires_at: Option<DateTime<Utc>>,
            ) -> Result<bool> {
                self.0.add(key, value, expires_at).await
            }
            async fn replace(
                &self,
                key: &str,
                value: CacheValue,
                expires_at: Option<DateTime<Utc>>,
            ) -> Result<bool> {
                self.0.replace(key, value, expires_at).await
            }
            async fn replace_if_equal(
                &self,
                key: &str,
                expected: &CacheValue,
                value: CacheValue,
                expires_at: Option<DateTime<Utc>>,
            ) -> Result<bool> {
                self.0.replace_if_equal(key, expected, value, expires_at).await
            }
            async fn remove_if_equal(&self, key: &str, expected: &CacheValue) -> Result<bool> {
                self.0.remove_if_equal(key, expected).await
            }
            async fn increment(
                &self,
                key: &str,
                amount: Number,
                expires_at: Option<DateTime<Utc>>,
            ) -> Result<Number> {
                self.0.increment(key, amount, expires_at).await
            }
            async fn set_if_higher(
                &self,
                key: &str,
                candidate: CacheValue,
                expires_at: Option<DateTime<Utc>>,
            ) -> Result<Arc<CacheValue>> {
                self.0.set_if_higher(key, candidate, expires_at).await
            }
            async fn set_if_lower(
                &self,
                key: &str,
                candidate: CacheValue,
                expires_at: Option<DateTime<Utc>>,
            ) -> Result<Arc<CacheValue>> {
                self.0.set_if_lower(key, candidate, expires_at).await
            }
            async fn get_expiration(&self, key: &str) -> Result<Option<Duration>> {
                self.0.get_expiration(key).await
            }
            async fn set_expiration(
                &self,
                key: &str,
                expires_at: DateTime<Utc>,
            ) -> Result<bool> {
                self.0.set_expiration(key, expires_at).await
            }
            async fn list_add(&self, key: &str, items: Vec<ListItem>) -> Result<usize> {
                self.0.list_add(key, items).await
            }
            async fn list_remove(&self, key: &str, values: &[CacheValue]) -> Result<usize> {
                self.0.list_remove(key, values).await
            }
            async fn get_list(
                &self,
                key: &str,
                page: usize,
                page_size: usize,
            ) -> Result<Vec<CacheValue>> {
                self.0.get_list(key, page, page_size).await
            }
            async fn contains(&self, key: &str) -> Result<bool> {
                self.0.contains(key).await
            }
            async fn remove(&self, key: &str) -> Result<bool> {
                self.0.remove(key).await
            }
            async fn remove_all(&self, keys: Option<&[String]>) -> Result<usize> {
                self.0.remove_all(keys).await
            }
            async fn remove_by_prefix(&self, prefix: &str) -> Result<usize> {
                self.0.remove_by_prefix(prefix).await
            }
            async fn get_all(
                &self,
                keys: &[String],
            ) -> Result<HashMap<String, Option<Arc<CacheValue>>>> {
                self.0.get_all(keys).await
            }
            async fn stats(&self) -> Result<CacheStats> {
                self.0.stats().await
            }
        }

        let backing = LocalCache::new(CacheOptions::default()).unwrap();
        backing.set("k", json!("old"), None).await.unwrap();
        let remote: Arc<dyn Cache> = Arc::new(StalledRemote(backing));
        let bus: Arc<dyn MessageBus> = Arc::new(InProcessBus::new());
        let hybrid = HybridCache::connect(
            remote,
            bus,
            HybridOptions::default()
                .with_origin_id("a")
                .with_remote_timeout(Some(StdDuration::from_millis(20))),
        )
        .await
        .unwrap();

        // Mirror the current value, then let the write stall out.
        hybrid.get("k").await.unwrap();
        let result = hybrid.set("k", json!("new"), None).await;
        assert!(matches!(result, Err(CacheError::Backend(_))));

        // No invalidation, no mirror eviction.
        assert!(hybrid.local().contains("k").await.unwrap());
        assert_eq!(*hybrid.get("k").await.unwrap().unwrap(), json!("old"));
    }
}
