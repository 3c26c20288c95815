//! Error types for the core engine

use std::time::Duration;
use thiserror::Error;

/// Errors raised while building triggers and commands at startup
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("Invalid pattern for trigger `{trigger}`: {source}")]
    InvalidPattern {
        trigger: String,
        #[source]
        source: regex::Error,
    },

    #[error("Trigger `{trigger}` mixes named and positional capture groups")]
    MixedGroupStyle { trigger: String },

    #[error("Trigger `{trigger}` binds capture group `{group}` in both patterns")]
    DuplicateGroup { trigger: String, group: String },

    #[error("Command `{0}` is registered twice")]
    DuplicateCommand(String),
}

/// Errors raised while turning configuration into a runnable bot
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Route `{channel}` references unknown command `{command}`")]
    UnknownCommand { channel: String, command: String },

    #[error("Invalid configuration value for `{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// Channel, user or resource lookups that could not be satisfied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Event is missing `{0}`")]
    MissingField(&'static str),

    #[error("{kind} {id} is not accessible")]
    Inaccessible { kind: &'static str, id: String },
}

/// Failures while invoking handlers or delivering their responses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Handler `{handler}` expects {expected} positional arguments, pattern captured {found}")]
    ArityMismatch {
        handler: String,
        expected: usize,
        found: usize,
    },

    #[error("Handler `{handler}` failed: {message}")]
    Handler { handler: String, message: String },

    #[error("Handler `{handler}` timed out after {after:?}")]
    Timeout { handler: String, after: Duration },

    #[error("Handler `{handler}` panicked")]
    Panicked { handler: String },

    #[error("Failed to deliver response: {0}")]
    Delivery(String),
}

/// Durable queue failures
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("Queued task could not be encoded: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for queue operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;
