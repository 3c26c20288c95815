use anyhow::{Context, Result};
use std::path::PathBuf;

const RELAYBOT_DIR: &str = "relaybot";
const LOGS_DIR: &str = "logs";

/// Environment variable to override the data directory.
const RELAYBOT_DIR_ENV: &str = "RELAYBOT_DIR";

/// Resolve the data directory.
/// Priority: RELAYBOT_DIR env var > <platform data dir>/relaybot
pub fn resolve_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(RELAYBOT_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|d| d.join(RELAYBOT_DIR))
        .ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))
}

/// Ensure the data directory exists and return its path.
pub fn data_dir() -> Result<PathBuf> {
    let dir = resolve_data_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
    Ok(dir)
}

/// Ensure the log directory exists and return its path.
pub fn log_dir() -> Result<PathBuf> {
    let dir = data_dir()?.join(LOGS_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
