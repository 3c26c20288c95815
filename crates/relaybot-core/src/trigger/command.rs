//! Commands and the command catalog
//!
//! A command is a named bundle of triggers plus optional help attachments.
//! It is the unit that routing configuration refers to, and the identity
//! used when deduplicating a channel's effective command list.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{
    Arity, HandlerFn, HandlerResult, Invocation, PatternSpec, TriggerHandle, TriggerMatch,
    TriggerRegistry, handler,
};
use crate::channel::types::{Attachment, BotIdentity, Subject};
use crate::error::RegistrationError;

/// Startup context handed to command constructors
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub bot: BotIdentity,
}

impl CommandContext {
    pub fn new(bot: BotIdentity) -> Self {
        Self { bot }
    }

    /// Mention markup of the bot, for use inside patterns
    pub fn bot_mention(&self) -> String {
        self.bot.mention()
    }
}

/// A named bundle of triggers
#[derive(Debug)]
pub struct Command {
    name: String,
    triggers: TriggerRegistry,
    help: Option<Vec<Attachment>>,
}

impl Command {
    pub fn builder(name: impl Into<String>) -> CommandBuilder {
        CommandBuilder {
            name: name.into(),
            triggers: TriggerRegistry::new(),
            help: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Help attachments, `None` when the command documents nothing
    pub fn help(&self) -> Option<&[Attachment]> {
        self.help.as_deref()
    }

    pub fn triggers(&self) -> &TriggerRegistry {
        &self.triggers
    }

    pub fn find_match(&self, subject: &Subject<'_>) -> Option<TriggerMatch<'_>> {
        self.triggers.find_match(subject)
    }
}

/// Builder registering triggers in order
pub struct CommandBuilder {
    name: String,
    triggers: TriggerRegistry,
    help: Option<Vec<Attachment>>,
}

impl CommandBuilder {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn trigger_name(&self, handler_name: &str) -> String {
        format!("{}::{}", self.name, handler_name)
    }

    /// Register a trigger with an explicit arity and a prebuilt handler
    pub fn on(
        &mut self,
        handler_name: &str,
        spec: PatternSpec,
        arity: Arity,
        handler: HandlerFn,
    ) -> Result<TriggerHandle, RegistrationError> {
        let name = self.trigger_name(handler_name);
        self.triggers.register(name, spec, arity, handler)
    }

    /// Message trigger on the text pattern
    pub fn on_message<F, Fut>(
        &mut self,
        handler_name: &str,
        pattern: &str,
        f: F,
    ) -> Result<TriggerHandle, RegistrationError>
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        self.on(
            handler_name,
            PatternSpec::message(pattern),
            Arity::Any,
            handler(f),
        )
    }

    /// Reaction trigger; both the reaction name and the message text must match
    pub fn on_reaction<F, Fut>(
        &mut self,
        handler_name: &str,
        reaction: &str,
        message: &str,
        f: F,
    ) -> Result<TriggerHandle, RegistrationError>
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        self.on(
            handler_name,
            PatternSpec::reaction_on(reaction, message),
            Arity::Any,
            handler(f),
        )
    }

    /// File share trigger; both the file type and the file name must match
    pub fn on_file_share<F, Fut>(
        &mut self,
        handler_name: &str,
        filetype: &str,
        name: &str,
        f: F,
    ) -> Result<TriggerHandle, RegistrationError>
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        self.on(
            handler_name,
            PatternSpec::file_share_named(filetype, name),
            Arity::Any,
            handler(f),
        )
    }

    pub fn with_help(&mut self, attachments: Vec<Attachment>) -> &mut Self {
        self.help = Some(attachments);
        self
    }

    pub fn build(self) -> Command {
        Command {
            name: self.name,
            triggers: self.triggers,
            help: self.help,
        }
    }
}

/// Constructor registered in a [`CommandCatalog`]
pub type CommandConstructor =
    Arc<dyn Fn(&mut CommandBuilder, &CommandContext) -> Result<(), RegistrationError> + Send + Sync>;

/// Instantiated commands by catalog name
pub type CommandSet = BTreeMap<String, Arc<Command>>;

/// Static catalog of command constructors, keyed by the name routes refer to
#[derive(Default)]
pub struct CommandCatalog {
    constructors: Vec<(String, CommandConstructor)>,
}

impl CommandCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, constructor: F) -> Result<&mut Self, RegistrationError>
    where
        F: Fn(&mut CommandBuilder, &CommandContext) -> Result<(), RegistrationError>
            + Send
            + Sync
            + 'static,
    {
        if self.contains(name) {
            return Err(RegistrationError::DuplicateCommand(name.to_string()));
        }
        self.constructors
            .push((name.to_string(), Arc::new(constructor)));
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.iter().map(|(n, _)| n.as_str())
    }

    /// Run every constructor; the first registration error aborts startup
    pub fn instantiate(&self, context: &CommandContext) -> Result<CommandSet, RegistrationError> {
        let mut commands = CommandSet::new();
        for (name, constructor) in &self.constructors {
            let mut builder = Command::builder(name.clone());
            constructor(&mut builder, context)?;
            let command = builder.build();
            tracing::debug!(
                command = %name,
                triggers = command.triggers().len(),
                "Registered command"
            );
            commands.insert(name.clone(), Arc::new(command));
        }
        Ok(commands)
    }
}
