//! Offloaded work: the queued task record and the durable queue boundary.

pub mod queue;
pub mod task;

pub use queue::{Delivery, DurableQueue, TaskQueue};
pub use task::QueuedTask;
