//! Configuration Module
//!
//! Options for the local cache engine and the hybrid coordinator, with
//! environment-variable loading and sensible defaults.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::cache::size::{SizeEstimator, StructuralEstimator};
use crate::clock::{Clock, SystemClock};

// == Cache Options ==
/// Options for a [`crate::LocalCache`] / [`crate::cache::CacheEngine`].
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Entry-count budget; `None` means unbounded
    pub max_items: Option<usize>,
    /// Approximate memory budget in bytes; requires an estimator
    pub max_memory_bytes: Option<usize>,
    /// Pluggable value sizing; `None` disables memory accounting
    pub estimator: Option<Arc<dyn SizeEstimator>>,
    /// Deep-copy values on read instead of aliasing the stored value
    pub clone_values: bool,
    /// Surface serialization failures instead of silently dropping the write
    pub throw_on_serialization_error: bool,
    /// Substitutable time source
    pub clock: Arc<dyn Clock>,
}

impl CacheOptions {
    /// Creates options by loading budgets from environment variables.
    ///
    /// # Environment Variables
    /// - `TIERKV_MAX_ITEMS` - Entry-count budget (default: unbounded)
    /// - `TIERKV_MAX_MEMORY_BYTES` - Memory budget in bytes (default: unbounded)
    pub fn from_env() -> Self {
        Self {
            max_items: env::var("TIERKV_MAX_ITEMS").ok().and_then(|v| v.parse().ok()),
            max_memory_bytes: env::var("TIERKV_MAX_MEMORY_BYTES")
                .ok()
                .and_then(|v| v.parse().ok()),
            ..Self::default()
        }
    }

    /// Sets the entry-count budget.
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    /// Sets the memory budget in bytes.
    pub fn with_max_memory_bytes(mut self, max_memory_bytes: usize) -> Self {
        self.max_memory_bytes = Some(max_memory_bytes);
        self
    }

    /// Replaces the size estimator.
    pub fn with_estimator(mut self, estimator: Arc<dyn SizeEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Removes the size estimator, disabling memory accounting.
    pub fn without_estimator(mut self) -> Self {
        self.estimator = None;
        self
    }

    /// Enables deep-copy-on-read semantics.
    pub fn with_clone_values(mut self, clone_values: bool) -> Self {
        self.clone_values = clone_values;
        self
    }

    /// Controls whether serialization failures surface as errors.
    pub fn with_throw_on_serialization_error(mut self, throw: bool) -> Self {
        self.throw_on_serialization_error = throw;
        self
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_items: None,
            max_memory_bytes: None,
            estimator: Some(Arc::new(StructuralEstimator)),
            clone_values: false,
            throw_on_serialization_error: true,
            clock: Arc::new(SystemClock),
        }
    }
}

// == Hybrid Options ==
/// Options for a [`crate::HybridCache`] coordinator.
#[derive(Debug, Clone)]
pub struct HybridOptions {
    /// Invalidation topic shared by the coordinator fleet
    pub topic: String,
    /// Identifier this instance stamps on published invalidations.
    /// Two live instances must never share an id, or they will drop each
    /// other's genuine invalidations as echoes.
    pub origin_id: String,
    /// TTL applied to values mirrored into the local tier. This bounds how
    /// long a sibling can serve stale data when an invalidation is lost.
    pub mirror_ttl: Option<Duration>,
    /// Deadline for each call into the distributed tier; `None` waits
    /// indefinitely
    pub remote_timeout: Option<Duration>,
    /// Options for the private local mirror
    pub mirror: CacheOptions,
}

impl HybridOptions {
    /// Creates options by loading overrides from environment variables.
    ///
    /// # Environment Variables
    /// - `TIERKV_TOPIC` - Invalidation topic (default: "tierkv.invalidation")
    /// - `TIERKV_MIRROR_TTL_SECS` - Mirror TTL in seconds (default: 300)
    /// - `TIERKV_REMOTE_TIMEOUT_MS` - Remote call deadline (default: none)
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(topic) = env::var("TIERKV_TOPIC") {
            options.topic = topic;
        }
        if let Some(secs) = env::var("TIERKV_MIRROR_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            options.mirror_ttl = Some(Duration::from_secs(secs));
        }
        if let Some(ms) = env::var("TIERKV_REMOTE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            options.remote_timeout = Some(Duration::from_millis(ms));
        }
        options
    }

    /// Sets the invalidation topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Sets the origin id stamped on published invalidations.
    pub fn with_origin_id(mut self, origin_id: impl Into<String>) -> Self {
        self.origin_id = origin_id.into();
        self
    }

    /// Sets the TTL applied to mirrored values.
    pub fn with_mirror_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.mirror_ttl = ttl;
        self
    }

    /// Sets the deadline for calls into the distributed tier.
    pub fn with_remote_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Replaces the mirror options.
    pub fn with_mirror(mut self, mirror: CacheOptions) -> Self {
        self.mirror = mirror;
        self
    }
}

impl Default for HybridOptions {
    fn default() -> Self {
        Self {
            topic: "tierkv.invalidation".to_string(),
            origin_id: Uuid::new_v4().to_string(),
            mirror_ttl: Some(Duration::from_secs(300)),
            remote_timeout: None,
            mirror: CacheOptions::default(),
        }
    }
}
