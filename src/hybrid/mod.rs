//! Hybrid Cache Module
//!
//! Composes a distributed cache with a private local mirror and keeps
//! mirrors across a fleet of instances coherent through broadcast
//! invalidation.

pub mod bus;
pub mod coordinator;
pub mod message;

// Re-export public types
pub use bus::{BusSubscription, InProcessBus, MessageBus};
pub use coordinator::HybridCache;
pub use message::{InvalidationAction, InvalidationMessage};
