//! Relaybot Core - event routing engine for chat bots.
//!
//! Raw platform events are classified into [`Interaction`]s, routed to the
//! commands active in their channel, matched against trigger patterns, and
//! either answered immediately or offloaded to a durable queue that the
//! [`OffloadWorker`] drains with bounded retry.

pub mod channel;
pub mod config;
pub mod error;
pub mod offload;
pub mod routing;
pub mod runtime;
pub mod trigger;

pub use channel::{
    Attachment, ChannelRef, DirectoryCache, DirectorySource, EventSource, Interaction,
    OutboundPayload, RawEvent, Responder, Response, UserRef,
};
pub use config::{AckPolicy, BotSettings, QueueSettings, RoutesConfig};
pub use error::{ConfigError, DispatchError, QueueError, RegistrationError, ResolutionError};
pub use offload::{DurableQueue, QueuedTask, TaskQueue};
pub use routing::{ALL_CHANNELS_KEY, ChannelKey, DIRECT_MESSAGE_KEY, RoutingTable};
pub use runtime::{
    Classifier, DispatchOutcome, Dispatcher, DispatcherConfig, Listener, OffloadWorker,
    RetryPolicy, TaskDisposition,
};
pub use trigger::{
    Arity, CapturedArgs, Command, CommandBuilder, CommandCatalog, CommandContext, CommandSet,
    Invocation, PatternSpec, TriggerRegistry,
};
