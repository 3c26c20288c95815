//! Chat Platform Types
//!
//! Raw events as delivered by the platform collaborator, the canonical
//! `Interaction` produced by the classifier, and the response/payload types
//! flowing back out.

use serde::{Deserialize, Serialize};

/// Channel name given to every direct message conversation.
pub const DIRECT_MESSAGE_NAME: &str = "__direct_message__";

/// Message text a file reaction is matched against.
pub const FILE_REACTION_TEXT: &str = " uploaded a file ";

/// Event category a trigger is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Reaction,
    FileShare,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Reaction => "reaction",
            Self::FileShare => "file_share",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[default]
    Public,
    Private,
    DirectMessage,
}

/// Resolved channel identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: ChannelKind,
}

impl ChannelRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }

    /// A direct message conversation; its name is always `__direct_message__`.
    pub fn direct_message(id: impl Into<String>) -> Self {
        Self::new(id, DIRECT_MESSAGE_NAME, ChannelKind::DirectMessage)
    }

    pub fn is_direct_message(&self) -> bool {
        self.kind == ChannelKind::DirectMessage
    }
}

/// Resolved user identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_bot: bool,
}

impl UserRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_bot: false,
        }
    }

    pub fn bot(mut self) -> Self {
        self.is_bot = true;
        self
    }
}

/// Identity of the bot user itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl BotIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: None,
        }
    }

    /// Mention markup, e.g. `<@U123>`
    pub fn mention(&self) -> String {
        format!("<@{}>", self.user_id)
    }
}

/// Direct message conversation listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessageInfo {
    pub id: String,
    pub user: String,
}

/// Uploaded file metadata
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileMeta {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub filetype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_private: Option<String>,
    /// Public channels the file was shared into
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
    /// Direct message conversations the file was shared into
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ims: Vec<String>,
}

/// A message fetched by timestamp (the target of a reaction)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub ts: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

// ---------------------------------------------------------------------------
// Inbound (firehose) events
// ---------------------------------------------------------------------------

/// One record of the platform firehose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    Message(RawMessage),
    ReactionAdded(RawReaction),
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub files: Vec<FileMeta>,
    /// Older payloads carry a single `file` instead of `files`
    #[serde(default)]
    pub file: Option<FileMeta>,
}

impl RawMessage {
    /// First shared file, whichever field it arrived in
    pub fn shared_file(&self) -> Option<&FileMeta> {
        self.files.first().or(self.file.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReaction {
    #[serde(default)]
    pub user: Option<String>,
    pub reaction: String,
    pub item: ReactionItem,
    #[serde(default)]
    pub event_ts: String,
}

/// What a reaction was added to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactionItem {
    Message {
        channel: String,
        ts: String,
    },
    File {
        file: String,
        #[serde(default)]
        channel: Option<String>,
    },
    #[serde(other)]
    Unsupported,
}

// ---------------------------------------------------------------------------
// Canonical interaction
// ---------------------------------------------------------------------------

/// Resource a reaction was added to, resolved by the classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactionTarget {
    Message(MessageRecord),
    File(FileMeta),
}

/// Kind-specific part of an interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Message {
        text: String,
    },
    Reaction {
        reaction: String,
        target: ReactionTarget,
    },
    FileShare {
        file: FileMeta,
        #[serde(default)]
        text: String,
    },
}

/// Strings a trigger's patterns are matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject<'a> {
    Message { text: &'a str },
    Reaction { reaction: &'a str, message: &'a str },
    FileShare { filetype: &'a str, name: &'a str },
}

impl Subject<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message { .. } => EventKind::Message,
            Self::Reaction { .. } => EventKind::Reaction,
            Self::FileShare { .. } => EventKind::FileShare,
        }
    }
}

/// Canonical, platform-agnostic representation of one classified event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(flatten)]
    pub payload: EventPayload,
    pub channel: ChannelRef,
    pub user: UserRef,
    /// Timestamp of the event itself (new threads and reactions anchor here)
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub is_deferred: bool,
}

impl Interaction {
    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Message { .. } => EventKind::Message,
            EventPayload::Reaction { .. } => EventKind::Reaction,
            EventPayload::FileShare { .. } => EventKind::FileShare,
        }
    }

    /// Message text, for message interactions only
    pub fn message_text(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Message { text } => Some(text),
            _ => None,
        }
    }

    pub fn subject(&self) -> Subject<'_> {
        match &self.payload {
            EventPayload::Message { text } => Subject::Message { text },
            EventPayload::Reaction { reaction, target } => Subject::Reaction {
                reaction,
                message: match target {
                    ReactionTarget::Message(record) => &record.text,
                    ReactionTarget::File(_) => FILE_REACTION_TEXT,
                },
            },
            EventPayload::FileShare { file, .. } => Subject::FileShare {
                filetype: &file.filetype,
                name: &file.name,
            },
        }
    }

    /// Copy of this interaction flagged for deferred (worker) execution
    pub fn into_deferred(mut self) -> Self {
        self.is_deferred = true;
        self
    }

    pub fn into_live(mut self) -> Self {
        self.is_deferred = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Message attachment, passed through to the platform unchanged
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mrkdwn_in: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Attachment {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_markdown(mut self, fields: &[&str]) -> Self {
        self.mrkdwn_in = fields.iter().map(|f| f.to_string()).collect();
        self
    }
}

/// What a handler asks the bot to do
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Response {
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// Reply inside this thread
    pub thread_ts: Option<String>,
    /// Start a thread at the triggering event when it is not threaded already
    pub thread_reply: bool,
    pub reaction_to_add: Option<String>,
    /// Accepted now, real work happens in a worker
    pub requires_offload: bool,
    /// Visible only to the triggering user
    pub ephemeral: bool,
}

impl Response {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Offload marker with a placeholder reply (may be empty)
    pub fn offload(placeholder: impl Into<String>) -> Self {
        Self {
            text: placeholder.into(),
            requires_offload: true,
            ..Default::default()
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn in_thread(mut self) -> Self {
        self.thread_reply = true;
        self
    }

    pub fn with_thread_ts(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }

    pub fn with_reaction(mut self, name: impl Into<String>) -> Self {
        self.reaction_to_add = Some(name.into());
        self
    }

    /// Nothing to post
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }
}

/// Platform API method used for a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PostMethod {
    #[default]
    #[serde(rename = "chat.postMessage")]
    PostMessage,
    #[serde(rename = "chat.postEphemeral")]
    PostEphemeral,
}

/// Payload handed to the responder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundPayload {
    pub channel: String,
    pub as_user: bool,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub method: PostMethod,
    /// Recipient of an ephemeral post
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl OutboundPayload {
    pub fn new(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            as_user: true,
            text: text.into(),
            attachments: Vec::new(),
            thread_ts: None,
            method: PostMethod::PostMessage,
            user: None,
        }
    }

    pub fn with_thread_ts(mut self, thread_ts: Option<String>) -> Self {
        self.thread_ts = thread_ts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_message_from_json() {
        let event: RawEvent = serde_json::from_value(json!({
            "type": "message",
            "channel": "C1",
            "user": "U1",
            "text": "test hello",
            "ts": "100.1",
            "thread_ts": "99.0"
        }))
        .unwrap();

        let RawEvent::Message(message) = event else {
            panic!("expected message");
        };
        assert_eq!(message.channel.as_deref(), Some("C1"));
        assert_eq!(message.thread_ts.as_deref(), Some("99.0"));
        assert!(message.subtype.is_none());
    }

    #[test]
    fn test_unknown_event_type_is_unsupported() {
        let event: RawEvent =
            serde_json::from_value(json!({"type": "user_typing", "channel": "C1"})).unwrap();
        assert_eq!(event, RawEvent::Unsupported);
    }

    #[test]
    fn test_reaction_item_variants() {
        let event: RawEvent = serde_json::from_value(json!({
            "type": "reaction_added",
            "user": "U1",
            "reaction": "thumbsup",
            "item": {"type": "file", "file": "F1"},
            "event_ts": "5.0"
        }))
        .unwrap();

        let RawEvent::ReactionAdded(reaction) = event else {
            panic!("expected reaction");
        };
        assert_eq!(
            reaction.item,
            ReactionItem::File {
                file: "F1".to_string(),
                channel: None
            }
        );
    }

    #[test]
    fn test_shared_file_prefers_files_list() {
        let message = RawMessage {
            files: vec![FileMeta {
                id: "F2".into(),
                ..Default::default()
            }],
            file: Some(FileMeta {
                id: "F1".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(message.shared_file().unwrap().id, "F2");
    }

    #[test]
    fn test_interaction_subject_for_file_reaction() {
        let interaction = Interaction {
            payload: EventPayload::Reaction {
                reaction: "eyes".into(),
                target: ReactionTarget::File(FileMeta::default()),
            },
            channel: ChannelRef::new("C1", "general", ChannelKind::Public),
            user: UserRef::new("U1", "alice"),
            ts: "1.0".into(),
            thread_ts: None,
            is_deferred: false,
        };

        assert_eq!(
            interaction.subject(),
            Subject::Reaction {
                reaction: "eyes",
                message: FILE_REACTION_TEXT
            }
        );
    }

    #[test]
    fn test_interaction_serde_keeps_kind_tag() {
        let interaction = Interaction {
            payload: EventPayload::Message {
                text: "hi".into(),
            },
            channel: ChannelRef::direct_message("D1"),
            user: UserRef::new("U1", "alice"),
            ts: "1.0".into(),
            thread_ts: None,
            is_deferred: false,
        };

        let value = serde_json::to_value(&interaction).unwrap();
        assert_eq!(value["kind"], "message");
        assert_eq!(value["channel"]["name"], DIRECT_MESSAGE_NAME);

        let parsed: Interaction = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, interaction);
    }

    #[test]
    fn test_response_is_empty() {
        assert!(Response::default().is_empty());
        assert!(Response::text("   ").is_empty());
        assert!(!Response::text("hi").is_empty());
        assert!(
            !Response::default()
                .with_attachments(vec![Attachment::new("t", "x")])
                .is_empty()
        );
    }

    #[test]
    fn test_outbound_payload_method_names() {
        let mut payload = OutboundPayload::new("C1", "hello");
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["method"], "chat.postMessage");
        assert_eq!(value["as_user"], true);
        assert!(value.get("thread_ts").is_none());

        payload.method = PostMethod::PostEphemeral;
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["method"], "chat.postEphemeral");
    }
}
