//! Event Classifier - turns raw firehose records into interactions.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::channel::directory::DirectoryCache;
use crate::channel::types::{
    EventPayload, Interaction, RawEvent, RawMessage, RawReaction, ReactionItem, ReactionTarget,
};
use crate::error::ResolutionError;

/// Message subtypes that never produce an interaction (edits, deletions, reply echoes)
pub const IGNORED_SUBTYPES: &[&str] = &["message_changed", "message_deleted", "message_replied"];

const FILE_SHARE_SUBTYPE: &str = "file_share";

/// Why a raw event produced no interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    UnsupportedEvent,
    IgnoredSubtype(String),
    /// Sent by the bot itself
    SelfMessage,
    /// Sent by another bot while bot users are ignored
    BotUser,
    Unresolved(ResolutionError),
}

impl From<ResolutionError> for DiscardReason {
    fn from(e: ResolutionError) -> Self {
        Self::Unresolved(e)
    }
}

/// Result of classifying one raw event
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Interaction(Interaction),
    Discard(DiscardReason),
}

pub struct Classifier {
    directory: Arc<DirectoryCache>,
    bot_user_id: String,
    ignore_bot_users: bool,
}

impl Classifier {
    pub fn new(directory: Arc<DirectoryCache>, bot_user_id: impl Into<String>) -> Self {
        Self {
            directory,
            bot_user_id: bot_user_id.into(),
            ignore_bot_users: false,
        }
    }

    pub fn ignore_bot_users(mut self, ignore: bool) -> Self {
        self.ignore_bot_users = ignore;
        self
    }

    pub fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    pub fn directory(&self) -> &Arc<DirectoryCache> {
        &self.directory
    }

    pub async fn classify(&self, raw: RawEvent) -> Classification {
        let result = match raw {
            RawEvent::Message(message) => self.classify_message(message).await,
            RawEvent::ReactionAdded(reaction) => self.classify_reaction(reaction).await,
            RawEvent::Unsupported => Err(DiscardReason::UnsupportedEvent),
        };

        match result {
            Ok(interaction) => {
                debug!(
                    kind = %interaction.kind(),
                    channel = %interaction.channel.name,
                    user = %interaction.user.name,
                    "Classified event"
                );
                Classification::Interaction(interaction)
            }
            Err(reason) => {
                match &reason {
                    DiscardReason::Unresolved(e) => warn!("Discarding event: {}", e),
                    other => debug!(reason = ?other, "Discarding event"),
                }
                Classification::Discard(reason)
            }
        }
    }

    async fn classify_message(&self, message: RawMessage) -> Result<Interaction, DiscardReason> {
        if let Some(subtype) = message.subtype.as_deref()
            && IGNORED_SUBTYPES.contains(&subtype)
        {
            return Err(DiscardReason::IgnoredSubtype(subtype.to_string()));
        }

        let user_id = message
            .user
            .as_deref()
            .ok_or(ResolutionError::MissingField("user"))?;
        self.reject_self(user_id)?;
        let channel_id = message
            .channel
            .as_deref()
            .ok_or(ResolutionError::MissingField("channel"))?;

        let payload = if message.subtype.as_deref() == Some(FILE_SHARE_SUBTYPE) {
            let file = message
                .shared_file()
                .cloned()
                .ok_or(ResolutionError::MissingField("file"))?;
            EventPayload::FileShare {
                file,
                text: message.text.clone(),
            }
        } else {
            EventPayload::Message {
                text: message.text.clone(),
            }
        };

        let channel = self.directory.channel(channel_id).await?;
        let user = self.directory.user(user_id).await?;
        if self.ignore_bot_users && user.is_bot {
            return Err(DiscardReason::BotUser);
        }

        Ok(Interaction {
            payload,
            channel,
            user,
            ts: message.ts,
            thread_ts: message.thread_ts,
            is_deferred: false,
        })
    }

    async fn classify_reaction(&self, reaction: RawReaction) -> Result<Interaction, DiscardReason> {
        let user_id = reaction
            .user
            .as_deref()
            .ok_or(ResolutionError::MissingField("user"))?;
        self.reject_self(user_id)?;

        let source = self.directory.source();
        let (channel_id, target, ts, thread_ts) = match &reaction.item {
            ReactionItem::Message { channel, ts } => {
                let record = source.fetch_message(channel, ts).await.unwrap_or_else(|e| {
                    warn!(channel = %channel, ts = %ts, "Failed to fetch reacted message: {:#}", e);
                    None
                });
                let record = record.ok_or_else(|| ResolutionError::Inaccessible {
                    kind: "message",
                    id: ts.clone(),
                })?;
                let thread_ts = record.thread_ts.clone();
                (
                    channel.clone(),
                    ReactionTarget::Message(record),
                    ts.clone(),
                    thread_ts,
                )
            }
            ReactionItem::File { file, channel } => {
                let meta = source.fetch_file(file).await.unwrap_or_else(|e| {
                    warn!(file = %file, "Failed to fetch reacted file: {:#}", e);
                    None
                });
                let meta = meta.ok_or_else(|| ResolutionError::Inaccessible {
                    kind: "file",
                    id: file.clone(),
                })?;
                // Item channel, else the first conversation the file was shared into
                let channel_id = channel
                    .clone()
                    .or_else(|| meta.ims.first().cloned())
                    .or_else(|| meta.channels.first().cloned())
                    .ok_or(ResolutionError::MissingField("channel"))?;
                (
                    channel_id,
                    ReactionTarget::File(meta),
                    reaction.event_ts.clone(),
                    None,
                )
            }
            ReactionItem::Unsupported => return Err(DiscardReason::UnsupportedEvent),
        };

        let channel = self.directory.channel(&channel_id).await?;
        let user = self.directory.user(user_id).await?;
        if self.ignore_bot_users && user.is_bot {
            return Err(DiscardReason::BotUser);
        }

        Ok(Interaction {
            payload: EventPayload::Reaction {
                reaction: reaction.reaction,
                target,
            },
            channel,
            user,
            ts,
            thread_ts,
            is_deferred: false,
        })
    }

    fn reject_self(&self, user_id: &str) -> Result<(), DiscardReason> {
        if user_id == self.bot_user_id {
            Err(DiscardReason::SelfMessage)
        } else {
            Ok(())
        }
    }

    /// Refresh channel and user of a replayed interaction through the cache
    pub async fn reresolve(&self, interaction: Interaction) -> Result<Interaction, ResolutionError> {
        let channel = self.directory.channel(&interaction.channel.id).await?;
        let user = self.directory.user(&interaction.user.id).await?;
        Ok(Interaction {
            channel,
            user,
            ..interaction
        })
    }
}
