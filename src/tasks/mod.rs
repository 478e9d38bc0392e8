//! Background Tasks Module
//!
//! Periodic maintenance running alongside foreground cache operations.

mod compaction;

pub use compaction::spawn_compaction_task;
