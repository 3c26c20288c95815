//! Dispatcher - route, match, and respond to (or offload) one interaction.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::channel::traits::Responder;
use crate::channel::types::{
    Attachment, BotIdentity, EventKind, Interaction, OutboundPayload, PostMethod, Response,
};
use crate::config::BotSettings;
use crate::error::DispatchError;
use crate::offload::{QueuedTask, TaskQueue};
use crate::routing::RoutingTable;
use crate::trigger::{Command, Invocation, Trigger};

/// Text of the help reply; the commands' attachments carry the details
pub const HELP_TEXT: &str = "Here are all the commands available in this channel";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Trimmed, lowercase phrases that trigger the help listing
    pub help_phrases: Vec<String>,
    pub handler_timeout: Option<Duration>,
}

impl DispatcherConfig {
    /// Default help phrases for `bot`, no handler timeout
    pub fn new(bot: &BotIdentity) -> Self {
        Self {
            help_phrases: vec![
                "help".to_string(),
                normalize_phrase(&format!("{} help", bot.mention())),
            ],
            handler_timeout: None,
        }
    }

    pub fn from_settings(settings: &BotSettings, bot: &BotIdentity) -> Self {
        let mut config = Self::new(bot);
        if let Some(phrases) = &settings.help_phrases {
            config.help_phrases = phrases.iter().map(|p| normalize_phrase(p)).collect();
        }
        config.handler_timeout = settings.handler_timeout();
        config
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    fn is_help(&self, text: &str) -> bool {
        let text = normalize_phrase(text);
        self.help_phrases.iter().any(|phrase| *phrase == text)
    }
}

fn normalize_phrase(text: &str) -> String {
    text.trim().to_lowercase()
}

/// What happened to one interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No command is routed to the channel
    NoRoute,
    /// No trigger produced a response
    NoMatch,
    /// A handler answered with nothing to post
    NoOp,
    Responded,
    Offloaded { task_id: String },
    /// The task could not be enqueued; the placeholder was still posted
    OffloadFailed,
}

pub struct Dispatcher {
    routing: Arc<RoutingTable>,
    responder: Arc<dyn Responder>,
    queue: Option<Arc<dyn TaskQueue>>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        routing: Arc<RoutingTable>,
        responder: Arc<dyn Responder>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            routing,
            responder,
            queue: None,
            config,
        }
    }

    /// Queue used for offloaded work; without one, offload requests fail
    pub fn with_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Handle one interaction.
    ///
    /// Live interactions never fail on handler errors, those are logged and
    /// skipped. Deferred interactions return them so the worker can retry.
    pub async fn handle(&self, interaction: Interaction) -> Result<DispatchOutcome, DispatchError> {
        let commands = self.routing.effective_commands(&interaction.channel);
        if commands.is_empty() {
            debug!(channel = %interaction.channel.name, "No commands routed to channel");
            return Ok(DispatchOutcome::NoRoute);
        }

        if interaction.kind() == EventKind::Message
            && let Some(text) = interaction.message_text()
            && self.config.is_help(text)
        {
            let response = help_response(&commands);
            return self.deliver(&interaction, &response).await;
        }

        let Some((command, response)) = self.first_response(&commands, &interaction).await? else {
            return Ok(DispatchOutcome::NoMatch);
        };

        if response.requires_offload {
            if interaction.is_deferred {
                warn!(
                    command = %command.name(),
                    "Offload requested while already deferred, responding directly"
                );
            } else {
                return self.offload(&interaction, &response).await;
            }
        }

        self.deliver(&interaction, &response).await
    }

    /// Walk the effective commands; within a command the first matching trigger wins
    async fn first_response(
        &self,
        commands: &[Arc<Command>],
        interaction: &Interaction,
    ) -> Result<Option<(Arc<Command>, Response)>, DispatchError> {
        let subject = interaction.subject();
        for command in commands {
            let Some(matched) = command.find_match(&subject) else {
                continue;
            };

            if let Err(e) = matched.check_arity() {
                warn!(command = %command.name(), "{}", e);
                continue;
            }

            let invocation = matched.invocation(interaction.clone());
            match self.invoke(matched.trigger, invocation).await {
                Ok(Some(response)) => return Ok(Some((command.clone(), response))),
                Ok(None) => continue,
                Err(e) if interaction.is_deferred => return Err(e),
                Err(e) => {
                    error!(command = %command.name(), "{}", e);
                    continue;
                }
            }
        }
        Ok(None)
    }

    async fn invoke(
        &self,
        trigger: &Trigger,
        invocation: Invocation,
    ) -> Result<Option<Response>, DispatchError> {
        debug!(handler = %trigger.name(), deferred = invocation.is_deferred(), "Invoking handler");
        let call = AssertUnwindSafe((trigger.handler())(invocation)).catch_unwind();

        let outcome = match self.config.handler_timeout {
            Some(after) => tokio::time::timeout(after, call)
                .await
                .map_err(|_| DispatchError::Timeout {
                    handler: trigger.name().to_string(),
                    after,
                })?,
            None => call.await,
        };

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(DispatchError::Handler {
                handler: trigger.name().to_string(),
                message: format!("{:#}", e),
            }),
            Err(_) => Err(DispatchError::Panicked {
                handler: trigger.name().to_string(),
            }),
        }
    }

    /// Enqueue the interaction and post the placeholder
    async fn offload(
        &self,
        interaction: &Interaction,
        placeholder: &Response,
    ) -> Result<DispatchOutcome, DispatchError> {
        let task = QueuedTask::new(interaction.clone());
        let enqueued = match &self.queue {
            Some(queue) => match queue.enqueue(&task).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(task_id = %task.id, "Enqueue failed, reconnecting: {}", e);
                    let retried = match queue.reconnect().await {
                        Ok(()) => queue.enqueue(&task).await,
                        Err(e) => Err(e),
                    };
                    match retried {
                        Ok(id) => Some(id),
                        Err(e) => {
                            error!(task_id = %task.id, "Failed to offload task: {}", e);
                            None
                        }
                    }
                }
            },
            None => {
                error!("Offload requested but no queue is configured");
                None
            }
        };

        let placeholder = Response {
            requires_offload: false,
            ..placeholder.clone()
        };
        if let Err(e) = self.deliver(interaction, &placeholder).await {
            debug!("Placeholder not delivered: {}", e);
        }

        Ok(match enqueued {
            Some(task_id) => {
                info!(task_id = %task_id, channel = %interaction.channel.name, "Offloaded task");
                DispatchOutcome::Offloaded { task_id }
            }
            None => DispatchOutcome::OffloadFailed,
        })
    }

    /// Add the requested reaction, then post unless the response is empty
    async fn deliver(
        &self,
        interaction: &Interaction,
        response: &Response,
    ) -> Result<DispatchOutcome, DispatchError> {
        if let Some(name) = &response.reaction_to_add
            && let Err(e) = self
                .responder
                .add_reaction(&interaction.channel.id, &interaction.ts, name)
                .await
        {
            warn!(reaction = %name, "Failed to add reaction: {:#}", e);
        }

        if response.is_empty() {
            debug!(channel = %interaction.channel.name, "Suppressing empty response");
            return Ok(DispatchOutcome::NoOp);
        }

        let payload = outbound_payload(interaction, response);
        if let Err(first) = self.responder.post(&payload).await {
            warn!(channel = %payload.channel, "Post failed, retrying: {:#}", first);
            if let Err(e) = self.responder.post(&payload).await {
                error!(channel = %payload.channel, "Failed to post response: {:#}", e);
                return Err(DispatchError::Delivery(format!("{:#}", e)));
            }
        }
        Ok(DispatchOutcome::Responded)
    }
}

/// Thread to reply in: a threaded interaction stays in its thread, otherwise
/// the handler may pick a thread or ask to start one at the event itself
pub fn reply_thread(interaction: &Interaction, response: &Response) -> Option<String> {
    if let Some(root) = &interaction.thread_ts {
        return Some(root.clone());
    }
    if let Some(thread_ts) = &response.thread_ts {
        return Some(thread_ts.clone());
    }
    response.thread_reply.then(|| interaction.ts.clone())
}

fn outbound_payload(interaction: &Interaction, response: &Response) -> OutboundPayload {
    let mut payload = OutboundPayload::new(&interaction.channel.id, &response.text)
        .with_thread_ts(reply_thread(interaction, response));
    payload.attachments = response.attachments.clone();
    if response.ephemeral {
        payload.method = PostMethod::PostEphemeral;
        payload.user = Some(interaction.user.id.clone());
    }
    payload
}

fn help_response(commands: &[Arc<Command>]) -> Response {
    let mut attachments: Vec<Attachment> = Vec::new();
    for command in commands {
        match command.help() {
            Some(help) => attachments.extend_from_slice(help),
            None => warn!(command = %command.name(), "Command has no help"),
        }
    }
    Response {
        text: HELP_TEXT.to_string(),
        attachments,
        ephemeral: true,
        ..Default::default()
    }
}
