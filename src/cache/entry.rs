//! Cache Entry Module
//!
//! Defines the structure of individual cache entries: the stored value,
//! expiration, access/modification timestamps and the approximate size
//! used for memory accounting.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::value::CacheValue;

// == List Item ==
/// One element of a list entry, optionally carrying its own expiration.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    /// The scalar value of this element
    pub value: CacheValue,
    /// Per-item expiration; `None` means the item lives as long as the entry
    pub expires_at: Option<DateTime<Utc>>,
}

impl ListItem {
    /// Creates an item without its own expiration.
    pub fn new(value: CacheValue) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Attaches an expiration to the item.
    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Checks whether the item has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

// == Stored Value ==
/// The two shapes a cache entry can hold: a single opaque value, or an
/// ordered set of scalar items.
#[derive(Debug, Clone)]
pub enum StoredValue {
    /// A single opaque value
    Scalar(Arc<CacheValue>),
    /// An ordered set of scalar items; duplicate values collapse to one
    List(Vec<ListItem>),
}

// == Cache Entry ==
/// A single key's stored value plus metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: StoredValue,
    /// Expiration instant; `None` means the entry never expires
    pub expires_at: Option<DateTime<Utc>>,
    /// Last time the entry was read (or created)
    pub last_access: DateTime<Utc>,
    /// Last time the entry was written (or created)
    pub last_modified: DateTime<Utc>,
    /// Approximate size in bytes, as reported by the configured estimator
    pub approx_size: usize,
}

impl CacheEntry {
    /// Creates a fresh entry; both timestamps start at `now`.
    pub fn new(
        value: StoredValue,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        approx_size: usize,
    ) -> Self {
        Self {
            value,
            expires_at,
            last_access: now,
            last_modified: now,
            approx_size,
        }
    }

    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry is expired when the current time is
    /// greater than or equal to its expiration instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }

    /// Returns the remaining time until expiry, or `None` when the entry
    /// never expires. An already-expired entry reports a zero duration.
    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at.map(|at| {
            if at > now {
                at - now
            } else {
                Duration::zero()
            }
        })
    }
}
