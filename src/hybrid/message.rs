//! Invalidation Message Module
//!
//! The wire form of the broadcast that keeps sibling coordinators' local
//! mirrors coherent. Messages are self-contained and idempotent to
//! re-apply, so at-least-once delivery and reordering across keys are
//! both safe.

use serde::{Deserialize, Serialize};

use crate::error::Result;

// == Invalidation Action ==
/// What the receiving coordinator should evict from its mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InvalidationAction {
    /// Evict the named keys
    RemoveKeys {
        /// Keys whose mirrored values are stale
        keys: Vec<String>,
    },
    /// Evict every key with the given literal prefix
    RemoveByPrefix {
        /// The prefix, matched literally
        prefix: String,
    },
    /// Clear the whole mirror
    RemoveAll,
}

// == Invalidation Message ==
/// One broadcast invalidation, stamped with the publishing instance's id
/// so that the publisher can recognize and drop its own echo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationMessage {
    /// Identifier of the instance that performed the mutation
    pub origin_id: String,
    /// What to evict
    #[serde(flatten)]
    pub action: InvalidationAction,
}

impl InvalidationMessage {
    /// Builds a message evicting specific keys.
    pub fn remove_keys(origin_id: impl Into<String>, keys: Vec<String>) -> Self {
        Self {
            origin_id: origin_id.into(),
            action: InvalidationAction::RemoveKeys { keys },
        }
    }

    /// Builds a message evicting a literal key prefix.
    pub fn remove_by_prefix(origin_id: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            origin_id: origin_id.into(),
            action: InvalidationAction::RemoveByPrefix {
                prefix: prefix.into(),
            },
        }
    }

    /// Builds a message clearing the whole mirror.
    pub fn remove_all(origin_id: impl Into<String>) -> Self {
        Self {
            origin_id: origin_id.into(),
            action: InvalidationAction::RemoveAll,
        }
    }

    /// Serializes the message for the bus.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserializes a message received from the bus.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}
