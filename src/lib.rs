//! tierkv - A two-tier caching library
//!
//! A bounded in-memory cache with TTL expiration, atomic counters,
//! ordered lists and budget-driven eviction, plus a coordinator that
//! layers a local mirror on top of a distributed cache and keeps
//! mirrors across instances coherent via broadcast invalidation.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod hybrid;
pub mod scoped;
pub mod tasks;
pub mod value;

pub use cache::{
    Cache, CacheEngine, CacheStats, CompactionReport, FixedEstimator, ListItem, LocalCache,
    SizeEstimator, StructuralEstimator,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheOptions, HybridOptions};
pub use error::{CacheError, Result};
pub use hybrid::{HybridCache, InProcessBus, InvalidationAction, InvalidationMessage, MessageBus};
pub use scoped::ScopedCache;
pub use tasks::spawn_compaction_task;
pub use value::{CacheValue, Number};
