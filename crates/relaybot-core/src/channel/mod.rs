//! Chat platform boundary
//!
//! Raw and canonical event types, the collaborator traits the engine talks
//! through, and the directory cache used to resolve identifiers.

pub mod directory;
pub mod traits;
pub mod types;

pub use directory::{DirectoryCache, LOOKUP_ATTEMPTS};
pub use traits::{DirectorySource, EventSource, Responder};
pub use types::{
    Attachment, BotIdentity, ChannelKind, ChannelRef, DIRECT_MESSAGE_NAME, DirectMessageInfo,
    EventKind, EventPayload, FILE_REACTION_TEXT, FileMeta, Interaction, MessageRecord,
    OutboundPayload, PostMethod, RawEvent, RawMessage, RawReaction, ReactionItem, ReactionTarget,
    Response, Subject, UserRef,
};
