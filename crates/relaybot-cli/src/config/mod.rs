//! Configuration file support
//!
//! Loads configuration from ~/.config/relaybot/config.toml, or the path given
//! with `--config` / `RELAYBOT_CONFIG`.

use anyhow::{Context, Result, anyhow};
use relaybot_core::{BotSettings, QueueSettings, RoutesConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths;

/// Whole configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bot: BotSettings,
    /// Channel key -> ordered command names
    #[serde(default)]
    pub routes: RoutesConfig,
    pub queue: QueueSettings,
    pub platform: PlatformConfig,
}

/// `[platform]` section for the file platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// TOML file listing the bot, channels, users, messages and files
    pub directory: PathBuf,
    /// Events read per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    50
}

impl AppConfig {
    /// Get the default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("relaybot").join("config.toml"))
    }

    /// Load from `path`, or the default path when none is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()
                .ok_or_else(|| anyhow!("Could not determine the configuration directory"))?,
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Config file not found or unreadable: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        // Relative platform paths are relative to the config file
        if config.platform.directory.is_relative()
            && let Some(parent) = path.parent()
        {
            config.platform.directory = parent.join(&config.platform.directory);
        }
        if let Some(queue_path) = &config.queue.path
            && queue_path.is_relative()
            && let Some(parent) = path.parent()
        {
            config.queue.path = Some(parent.join(queue_path));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.bot.validate()?;
        self.queue.validate()?;
        self.queue
            .validate_handler_timeout(self.bot.handler_timeout())?;
        if self.platform.batch_size == 0 {
            return Err(anyhow!(
                "Invalid configuration value for `platform.batch_size`: must be at least 1"
            ));
        }
        Ok(())
    }

    /// Queue database file, defaulting to the data directory
    pub fn queue_path(&self) -> Result<PathBuf> {
        match &self.queue.path {
            Some(path) => Ok(path.clone()),
            None => Ok(paths::data_dir()?.join("queue.redb")),
        }
    }
}
