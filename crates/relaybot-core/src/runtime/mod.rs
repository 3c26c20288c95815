//! Runtime - classification, dispatch, the live listener loop and the offload worker.

pub mod classifier;
pub mod dispatcher;
pub mod listener;
pub mod worker;

pub use classifier::{Classification, Classifier, DiscardReason};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherConfig, HELP_TEXT};
pub use listener::{Listener, ListenerStats};
pub use worker::{OffloadWorker, RetryPolicy, TaskDisposition};
