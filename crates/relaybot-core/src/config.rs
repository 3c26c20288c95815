//! Engine settings
//!
//! Deserializable sections shared by the listener and the worker. Loading the
//! file itself is the binary's job.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Channel key -> ordered command names
pub type RoutesConfig = BTreeMap<String, Vec<String>>;

/// `[bot]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotSettings {
    /// Overrides the identity reported by the platform
    #[serde(default)]
    pub user_id: Option<String>,
    /// Phrases answered with the help listing; defaults to `help` and `<@BOT> help`
    #[serde(default)]
    pub help_phrases: Option<Vec<String>>,
    #[serde(default)]
    pub ignore_bot_users: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub handler_timeout_secs: Option<u64>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            user_id: None,
            help_phrases: None,
            ignore_bot_users: false,
            poll_interval_ms: default_poll_interval_ms(),
            handler_timeout_secs: None,
        }
    }
}

impl BotSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handler_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "bot.handler_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// When a worker acknowledges a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Remove on receipt; a crash mid-task loses the task
    BeforeProcess,
    /// Hold in flight until the task finishes; expired claims are redelivered
    AfterProcess,
}

impl std::fmt::Display for AckPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BeforeProcess => write!(f, "before_process"),
            Self::AfterProcess => write!(f, "after_process"),
        }
    }
}

/// `[queue]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Queue database file; defaults to the data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Required, there is no default acknowledgement strategy
    pub ack_policy: AckPolicy,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
}

impl QueueSettings {
    pub fn new(ack_policy: AckPolicy) -> Self {
        Self {
            path: None,
            ack_policy,
            max_attempts: default_max_attempts(),
            lease_secs: default_lease_secs(),
            idle_poll_ms: default_idle_poll_ms(),
            lock_wait_ms: default_lock_wait_ms(),
        }
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "queue.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.ack_policy == AckPolicy::AfterProcess && self.lease_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "queue.lease_secs",
                reason: "must be greater than zero with after_process".to_string(),
            });
        }
        Ok(())
    }

    /// A handler that may outlive the lease would see its task redelivered to
    /// another worker while still running it.
    pub fn validate_handler_timeout(&self, timeout: Option<Duration>) -> Result<(), ConfigError> {
        if self.ack_policy != AckPolicy::AfterProcess {
            return Ok(());
        }
        match timeout {
            Some(timeout) if timeout >= self.lease() => Err(ConfigError::InvalidValue {
                key: "bot.handler_timeout_secs",
                reason: format!(
                    "must be shorter than queue.lease_secs ({}) with after_process",
                    self.lease_secs
                ),
            }),
            _ => Ok(()),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_lease_secs() -> u64 {
    300
}

fn default_idle_poll_ms() -> u64 {
    500
}

fn default_lock_wait_ms() -> u64 {
    2000
}
