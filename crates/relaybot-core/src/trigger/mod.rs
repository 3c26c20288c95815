//! Trigger Registry
//!
//! Pattern matchers scoped to one event kind, each bound to a handler.
//! Matching is pure: no I/O happens until the dispatcher invokes the handler
//! of the winning trigger.

pub mod command;

pub use command::{Command, CommandBuilder, CommandCatalog, CommandContext, CommandSet};

use futures::future::BoxFuture;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crate::channel::types::{EventKind, Interaction, Response, Subject};
use crate::error::{DispatchError, RegistrationError};

/// Everything a handler receives for one invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub interaction: Interaction,
    pub args: CapturedArgs,
}

impl Invocation {
    /// True when running inside the offload worker
    pub fn is_deferred(&self) -> bool {
        self.interaction.is_deferred
    }
}

/// Handler result: `Ok(None)` means "no response"
pub type HandlerResult = anyhow::Result<Option<Response>>;

/// Type-erased async handler
pub type HandlerFn = Arc<dyn Fn(Invocation) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Wrap an async function or closure as a [`HandlerFn`]
pub fn handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |invocation| Box::pin(f(invocation)))
}

/// Number of positional arguments a handler accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Arity {
    #[default]
    Any,
    Exact(usize),
}

/// Values bound from capture groups
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedArgs {
    pub positional: Vec<String>,
    pub named: BTreeMap<String, String>,
}

impl CapturedArgs {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    pub fn positional(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// Source patterns of a trigger, one or two sub-fields depending on the kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSpec {
    Message { text: String },
    Reaction { reaction: String, message: String },
    FileShare { filetype: String, name: String },
}

impl PatternSpec {
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message { text: text.into() }
    }

    /// Reaction name pattern, any message
    pub fn reaction(reaction: impl Into<String>) -> Self {
        Self::reaction_on(reaction, ".*")
    }

    pub fn reaction_on(reaction: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Reaction {
            reaction: reaction.into(),
            message: message.into(),
        }
    }

    /// File type pattern, any file name
    pub fn file_share(filetype: impl Into<String>) -> Self {
        Self::file_share_named(filetype, ".*")
    }

    pub fn file_share_named(filetype: impl Into<String>, name: impl Into<String>) -> Self {
        Self::FileShare {
            filetype: filetype.into(),
            name: name.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message { .. } => EventKind::Message,
            Self::Reaction { .. } => EventKind::Reaction,
            Self::FileShare { .. } => EventKind::FileShare,
        }
    }

    fn sources(&self) -> Vec<&str> {
        match self {
            Self::Message { text } => vec![text],
            Self::Reaction { reaction, message } => vec![reaction, message],
            Self::FileShare { filetype, name } => vec![filetype, name],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupStyle {
    None,
    Named,
    Positional,
}

fn group_style(regex: &Regex, trigger: &str) -> Result<GroupStyle, RegistrationError> {
    // Index 0 is the implicit whole-match group
    let (named, positional) = regex
        .capture_names()
        .skip(1)
        .fold((0usize, 0usize), |(n, p), name| match name {
            Some(_) => (n + 1, p),
            None => (n, p + 1),
        });

    match (named, positional) {
        (0, 0) => Ok(GroupStyle::None),
        (_, 0) => Ok(GroupStyle::Named),
        (0, _) => Ok(GroupStyle::Positional),
        _ => Err(RegistrationError::MixedGroupStyle {
            trigger: trigger.to_string(),
        }),
    }
}

fn compile(spec: &PatternSpec, trigger: &str) -> Result<(Vec<Regex>, GroupStyle), RegistrationError> {
    let mut patterns = Vec::new();
    let mut style = GroupStyle::None;

    for source in spec.sources() {
        let regex = Regex::new(source).map_err(|source| RegistrationError::InvalidPattern {
            trigger: trigger.to_string(),
            source,
        })?;

        style = match (style, group_style(&regex, trigger)?) {
            (current, GroupStyle::None) => current,
            (GroupStyle::None, next) => next,
            (current, next) if current == next => current,
            _ => {
                return Err(RegistrationError::MixedGroupStyle {
                    trigger: trigger.to_string(),
                });
            }
        };

        patterns.push(regex);
    }

    if style == GroupStyle::Named {
        let mut seen = std::collections::HashSet::new();
        for name in patterns.iter().flat_map(|p| p.capture_names().flatten()) {
            if !seen.insert(name) {
                return Err(RegistrationError::DuplicateGroup {
                    trigger: trigger.to_string(),
                    group: name.to_string(),
                });
            }
        }
    }

    Ok((patterns, style))
}

/// A registered (pattern, handler) pair
pub struct Trigger {
    name: String,
    spec: PatternSpec,
    patterns: Vec<Regex>,
    style: GroupStyle,
    arity: Arity,
    handler: HandlerFn,
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl Trigger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EventKind {
        self.spec.kind()
    }

    pub fn spec(&self) -> &PatternSpec {
        &self.spec
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn handler(&self) -> &HandlerFn {
        &self.handler
    }

    /// Match the subject against every sub-field pattern; all must match
    fn captures(&self, subject: &Subject<'_>) -> Option<CapturedArgs> {
        if subject.kind() != self.kind() {
            return None;
        }

        let fields: Vec<&str> = match *subject {
            Subject::Message { text } => vec![text],
            Subject::Reaction { reaction, message } => vec![reaction, message],
            Subject::FileShare { filetype, name } => vec![filetype, name],
        };

        let mut all = Vec::with_capacity(self.patterns.len());
        for (pattern, field) in self.patterns.iter().zip(fields) {
            all.push((pattern, pattern.captures(field)?));
        }

        let mut args = CapturedArgs::default();
        for (pattern, caps) in &all {
            bind(pattern, caps, self.style, &mut args);
        }
        Some(args)
    }
}

fn bind(pattern: &Regex, caps: &Captures<'_>, style: GroupStyle, args: &mut CapturedArgs) {
    for (index, name) in pattern.capture_names().enumerate().skip(1) {
        // Unmatched optional groups bind as the empty string
        let value = caps
            .get(index)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        match (style, name) {
            (GroupStyle::Named, Some(name)) => {
                args.named.insert(name.to_string(), value);
            }
            _ => args.positional.push(value),
        }
    }
}

/// Index of a trigger in its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerHandle(usize);

impl TriggerHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// The winning trigger and what its patterns captured
#[derive(Debug)]
pub struct TriggerMatch<'a> {
    pub trigger: &'a Trigger,
    pub args: CapturedArgs,
}

impl TriggerMatch<'_> {
    /// Compare captured positional values with the handler's declared arity
    pub fn check_arity(&self) -> Result<(), DispatchError> {
        match self.trigger.arity {
            Arity::Exact(expected) if expected != self.args.positional.len() => {
                Err(DispatchError::ArityMismatch {
                    handler: self.trigger.name.clone(),
                    expected,
                    found: self.args.positional.len(),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn invocation(&self, interaction: Interaction) -> Invocation {
        Invocation {
            interaction,
            args: self.args.clone(),
        }
    }
}

/// Ordered triggers; the first match wins
#[derive(Debug, Default)]
pub struct TriggerRegistry {
    triggers: Vec<Trigger>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and append a trigger
    pub fn register(
        &mut self,
        name: impl Into<String>,
        spec: PatternSpec,
        arity: Arity,
        handler: HandlerFn,
    ) -> Result<TriggerHandle, RegistrationError> {
        let name = name.into();
        let (patterns, style) = compile(&spec, &name)?;

        let handle = TriggerHandle(self.triggers.len());
        self.triggers.push(Trigger {
            name,
            spec,
            patterns,
            style,
            arity,
            handler,
        });
        Ok(handle)
    }

    /// First trigger, in registration order, whose patterns all match
    pub fn find_match(&self, subject: &Subject<'_>) -> Option<TriggerMatch<'_>> {
        self.triggers.iter().find_map(|trigger| {
            trigger
                .captures(subject)
                .map(|args| TriggerMatch { trigger, args })
        })
    }

    pub fn get(&self, handle: TriggerHandle) -> Option<&Trigger> {
        self.triggers.get(handle.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.iter()
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}
