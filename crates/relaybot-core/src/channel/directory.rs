//! Directory Cache
//!
//! Process-local cache of channels, direct message conversations and users.
//! A lookup miss refreshes the relevant listing once and looks again; a
//! second miss is reported to the caller.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::traits::DirectorySource;
use super::types::{ChannelRef, UserRef};
use crate::error::ResolutionError;

/// Lookups made per resolution (the second follows a refresh)
pub const LOOKUP_ATTEMPTS: usize = 2;

#[derive(Default)]
struct DirectoryState {
    channels: HashMap<String, ChannelRef>,
    users: HashMap<String, UserRef>,
}

/// Refreshable directory owned by the classifier
pub struct DirectoryCache {
    source: Arc<dyn DirectorySource>,
    state: RwLock<DirectoryState>,
}

impl DirectoryCache {
    /// Create an empty cache; the first lookup fills it
    pub fn new(source: Arc<dyn DirectorySource>) -> Self {
        Self {
            source,
            state: RwLock::new(DirectoryState::default()),
        }
    }

    /// Reload every listing
    pub async fn refresh(&self) -> Result<()> {
        self.refresh_channels().await?;
        self.refresh_users().await
    }

    /// Reload channels, private groups and direct message conversations
    pub async fn refresh_channels(&self) -> Result<()> {
        let mut channels: HashMap<String, ChannelRef> = self
            .source
            .list_channels()
            .await?
            .into_iter()
            .map(|channel| (channel.id.clone(), channel))
            .collect();

        for dm in self.source.list_direct_messages().await? {
            channels.insert(dm.id.clone(), ChannelRef::direct_message(dm.id));
        }

        debug!(count = channels.len(), "Refreshed channel directory");
        self.state.write().await.channels = channels;
        Ok(())
    }

    pub async fn refresh_users(&self) -> Result<()> {
        let users: HashMap<String, UserRef> = self
            .source
            .list_users()
            .await?
            .into_iter()
            .map(|user| (user.id.clone(), user))
            .collect();

        debug!(count = users.len(), "Refreshed user directory");
        self.state.write().await.users = users;
        Ok(())
    }

    /// Resolve a channel id
    pub async fn channel(&self, id: &str) -> Result<ChannelRef, ResolutionError> {
        for attempt in 1..=LOOKUP_ATTEMPTS {
            if let Some(channel) = self.state.read().await.channels.get(id) {
                return Ok(channel.clone());
            }
            if attempt < LOOKUP_ATTEMPTS
                && let Err(e) = self.refresh_channels().await
            {
                warn!(channel = id, "Channel directory refresh failed: {:#}", e);
            }
        }
        Err(ResolutionError::ChannelNotFound(id.to_string()))
    }

    /// Resolve a user id
    pub async fn user(&self, id: &str) -> Result<UserRef, ResolutionError> {
        for attempt in 1..=LOOKUP_ATTEMPTS {
            if let Some(user) = self.state.read().await.users.get(id) {
                return Ok(user.clone());
            }
            if attempt < LOOKUP_ATTEMPTS
                && let Err(e) = self.refresh_users().await
            {
                warn!(user = id, "User directory refresh failed: {:#}", e);
            }
        }
        Err(ResolutionError::UserNotFound(id.to_string()))
    }

    /// Underlying directory, for resource fetches that are not cached
    pub fn source(&self) -> &Arc<dyn DirectorySource> {
        &self.source
    }
}
