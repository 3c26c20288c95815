//! Relaybot Storage - durable queue persistence
//!
//! This crate provides the persistence layer for offloaded work, using redb as
//! the embedded database. It exposes byte-level APIs so the core crate owns the
//! task format.
//!
//! # Tables
//!
//! - `pending` - Tasks waiting for a worker, keyed `{seq:020}:{task_id}` (FIFO)
//! - `in_flight` - Tasks claimed by a worker that acknowledges after processing
//! - `queue_meta` - Sequence counter

pub mod task_queue;

pub use task_queue::{ClaimedEntry, TaskQueueStore};
