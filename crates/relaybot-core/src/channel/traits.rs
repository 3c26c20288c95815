//! Collaborator Trait Definitions
//!
//! The engine never talks to the chat platform directly. It consumes a raw
//! event stream, a directory of channels and users, and a way to post
//! responses; each is a trait implemented by the platform collaborator.

use anyhow::Result;
use async_trait::async_trait;

use super::types::{
    BotIdentity, ChannelRef, DirectMessageInfo, FileMeta, MessageRecord, OutboundPayload, RawEvent,
    UserRef,
};

/// Source of raw platform events (the firehose)
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Read the next batch of events.
    ///
    /// `Ok(Some(vec![]))` means nothing arrived this time, `Ok(None)` means the
    /// stream is closed for good.
    async fn poll_events(&self) -> Result<Option<Vec<RawEvent>>>;
}

/// Channel, user and resource listings used to resolve raw identifiers
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Identity of the bot account
    async fn bot_identity(&self) -> Result<BotIdentity>;

    /// Public channels and private groups the bot can see
    async fn list_channels(&self) -> Result<Vec<ChannelRef>>;

    /// Direct message conversations
    async fn list_direct_messages(&self) -> Result<Vec<DirectMessageInfo>>;

    async fn list_users(&self) -> Result<Vec<UserRef>>;

    /// Fetch one message by channel and timestamp; `None` when inaccessible
    async fn fetch_message(&self, channel_id: &str, ts: &str) -> Result<Option<MessageRecord>>;

    /// Fetch file metadata; `None` when inaccessible
    async fn fetch_file(&self, file_id: &str) -> Result<Option<FileMeta>>;
}

/// Outbound side of the platform
#[async_trait]
pub trait Responder: Send + Sync {
    async fn post(&self, payload: &OutboundPayload) -> Result<()>;

    /// Add an emoji reaction to the message at `ts`
    async fn add_reaction(&self, channel_id: &str, ts: &str, name: &str) -> Result<()>;
}

/// Mock collaborators for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use crate::channel::types::{ChannelKind, RawMessage};
    use anyhow::anyhow;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// A reaction recorded by [`MockPlatform`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct AddedReaction {
        pub channel: String,
        pub ts: String,
        pub name: String,
    }

    /// In-memory platform implementing every collaborator trait
    pub struct MockPlatform {
        bot: BotIdentity,
        channels: Arc<Mutex<Vec<ChannelRef>>>,
        direct_messages: Arc<Mutex<Vec<DirectMessageInfo>>>,
        users: Arc<Mutex<Vec<UserRef>>>,
        messages: Arc<Mutex<HashMap<(String, String), MessageRecord>>>,
        files: Arc<Mutex<HashMap<String, FileMeta>>>,
        events: Arc<Mutex<VecDeque<Vec<RawEvent>>>>,
        posted: Arc<Mutex<Vec<OutboundPayload>>>,
        reactions: Arc<Mutex<Vec<AddedReaction>>>,
        channel_listings: AtomicUsize,
        fail_posts: AtomicBool,
        fail_reactions: AtomicBool,
    }

    impl MockPlatform {
        /// Create a mock platform whose bot user is `bot_user_id`
        pub fn new(bot_user_id: &str) -> Self {
            Self {
                bot: BotIdentity::new(bot_user_id),
                channels: Arc::new(Mutex::new(Vec::new())),
                direct_messages: Arc::new(Mutex::new(Vec::new())),
                users: Arc::new(Mutex::new(Vec::new())),
                messages: Arc::new(Mutex::new(HashMap::new())),
                files: Arc::new(Mutex::new(HashMap::new())),
                events: Arc::new(Mutex::new(VecDeque::new())),
                posted: Arc::new(Mutex::new(Vec::new())),
                reactions: Arc::new(Mutex::new(Vec::new())),
                channel_listings: AtomicUsize::new(0),
                fail_posts: AtomicBool::new(false),
                fail_reactions: AtomicBool::new(false),
            }
        }

        /// A platform with channel `C1`/`general`, DM `D1` with `U1`, and users `U1` (alice) and the bot
        pub async fn with_defaults(bot_user_id: &str) -> Self {
            let platform = Self::new(bot_user_id);
            platform
                .add_channel(ChannelRef::new("C1", "general", ChannelKind::Public))
                .await;
            platform.add_direct_message("D1", "U1").await;
            platform.add_user(UserRef::new("U1", "alice")).await;
            platform
                .add_user(UserRef::new(bot_user_id, "relaybot").bot())
                .await;
            platform
        }

        pub async fn add_channel(&self, channel: ChannelRef) {
            self.channels.lock().await.push(channel);
        }

        pub async fn add_direct_message(&self, id: &str, user: &str) {
            self.direct_messages.lock().await.push(DirectMessageInfo {
                id: id.to_string(),
                user: user.to_string(),
            });
        }

        pub async fn add_user(&self, user: UserRef) {
            self.users.lock().await.push(user);
        }

        pub async fn add_message(&self, channel_id: &str, record: MessageRecord) {
            self.messages
                .lock()
                .await
                .insert((channel_id.to_string(), record.ts.clone()), record);
        }

        pub async fn add_file(&self, file: FileMeta) {
            self.files.lock().await.insert(file.id.clone(), file);
        }

        /// Queue one batch for `poll_events`
        pub async fn push_events(&self, batch: Vec<RawEvent>) {
            self.events.lock().await.push_back(batch);
        }

        /// Queue a single plain message event
        pub async fn push_message(&self, channel: &str, user: &str, text: &str, ts: &str) {
            self.push_events(vec![RawEvent::Message(RawMessage {
                channel: Some(channel.to_string()),
                user: Some(user.to_string()),
                text: text.to_string(),
                ts: ts.to_string(),
                ..Default::default()
            })])
            .await;
        }

        /// Get all posted payloads
        pub async fn posted(&self) -> Vec<OutboundPayload> {
            self.posted.lock().await.clone()
        }

        /// Get all added reactions
        pub async fn reactions(&self) -> Vec<AddedReaction> {
            self.reactions.lock().await.clone()
        }

        /// Number of `list_channels` calls so far (one per directory refresh)
        pub fn channel_listings(&self) -> usize {
            self.channel_listings.load(Ordering::SeqCst)
        }

        pub fn set_fail_posts(&self, fail: bool) {
            self.fail_posts.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_reactions(&self, fail: bool) {
            self.fail_reactions.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl EventSource for MockPlatform {
        async fn poll_events(&self) -> Result<Option<Vec<RawEvent>>> {
            Ok(self.events.lock().await.pop_front())
        }
    }

    #[async_trait]
    impl DirectorySource for MockPlatform {
        async fn bot_identity(&self) -> Result<BotIdentity> {
            Ok(self.bot.clone())
        }

        async fn list_channels(&self) -> Result<Vec<ChannelRef>> {
            self.channel_listings.fetch_add(1, Ordering::SeqCst);
            Ok(self.channels.lock().await.clone())
        }

        async fn list_direct_messages(&self) -> Result<Vec<DirectMessageInfo>> {
            Ok(self.direct_messages.lock().await.clone())
        }

        async fn list_users(&self) -> Result<Vec<UserRef>> {
            Ok(self.users.lock().await.clone())
        }

        async fn fetch_message(&self, channel_id: &str, ts: &str) -> Result<Option<MessageRecord>> {
            Ok(self
                .messages
                .lock()
                .await
                .get(&(channel_id.to_string(), ts.to_string()))
                .cloned())
        }

        async fn fetch_file(&self, file_id: &str) -> Result<Option<FileMeta>> {
            Ok(self.files.lock().await.get(file_id).cloned())
        }
    }

    #[async_trait]
    impl Responder for MockPlatform {
        async fn post(&self, payload: &OutboundPayload) -> Result<()> {
            if self.fail_posts.load(Ordering::SeqCst) {
                return Err(anyhow!("Mock post failure"));
            }
            self.posted.lock().await.push(payload.clone());
            Ok(())
        }

        async fn add_reaction(&self, channel_id: &str, ts: &str, name: &str) -> Result<()> {
            if self.fail_reactions.load(Ordering::SeqCst) {
                return Err(anyhow!("Mock reaction failure"));
            }
            self.reactions.lock().await.push(AddedReaction {
                channel: channel_id.to_string(),
                ts: ts.to_string(),
                name: name.to_string(),
            });
            Ok(())
        }
    }
}
