//! Directory file schema
//!
//! ```toml
//! [bot]
//! user_id = "UBOT"
//!
//! [[channels]]
//! id = "C1"
//! name = "general"
//! kind = "public"
//!
//! [[direct_messages]]
//! id = "D1"
//! user = "U1"
//!
//! [[users]]
//! id = "U1"
//! name = "alice"
//! ```

use anyhow::{Context, Result};
use relaybot_core::channel::{BotIdentity, ChannelRef, DirectMessageInfo, FileMeta, MessageRecord};
use relaybot_core::UserRef;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryFile {
    pub bot: BotIdentity,
    #[serde(default)]
    pub channels: Vec<ChannelRef>,
    #[serde(default)]
    pub direct_messages: Vec<DirectMessageInfo>,
    #[serde(default)]
    pub users: Vec<UserRef>,
    /// Messages that reactions can point at
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
    #[serde(default)]
    pub files: Vec<FileMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoredMessage {
    pub channel: String,
    #[serde(flatten)]
    pub record: MessageRecord,
}

impl DirectoryFile {
    pub async fn read(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read directory file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid directory file {}", path.display()))
    }

    pub fn message(&self, channel_id: &str, ts: &str) -> Option<MessageRecord> {
        self.messages
            .iter()
            .find(|m| m.channel == channel_id && m.record.ts == ts)
            .map(|m| m.record.clone())
    }

    pub fn file(&self, file_id: &str) -> Option<FileMeta> {
        self.files.iter().find(|f| f.id == file_id).cloned()
    }
}
