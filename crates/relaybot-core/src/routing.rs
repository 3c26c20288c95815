//! Routing Table
//!
//! Maps channels to ordered command lists. `__all__` applies to every
//! non-direct-message channel, `__direct_message__` to every direct message
//! conversation.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::channel::types::{ChannelRef, DIRECT_MESSAGE_NAME};
use crate::config::RoutesConfig;
use crate::error::ConfigError;
use crate::trigger::{Command, CommandSet};

/// Reserved key applying to every non-direct-message channel
pub const ALL_CHANNELS_KEY: &str = "__all__";

/// Reserved key applying to every direct message conversation
pub const DIRECT_MESSAGE_KEY: &str = DIRECT_MESSAGE_NAME;

/// Channel key of a routing entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    /// A concrete channel name or id
    Explicit(String),
    AllChannels,
    DirectMessage,
}

impl ChannelKey {
    pub fn parse(key: &str) -> Self {
        match key {
            ALL_CHANNELS_KEY => Self::AllChannels,
            DIRECT_MESSAGE_KEY => Self::DirectMessage,
            other => Self::Explicit(other.to_string()),
        }
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit(key) => f.write_str(key),
            Self::AllChannels => f.write_str(ALL_CHANNELS_KEY),
            Self::DirectMessage => f.write_str(DIRECT_MESSAGE_KEY),
        }
    }
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: HashMap<ChannelKey, Vec<Arc<Command>>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append commands to a channel key's entry
    pub fn add(&mut self, key: ChannelKey, commands: impl IntoIterator<Item = Arc<Command>>) {
        self.entries.entry(key).or_default().extend(commands);
    }

    /// Build from `[routes]`, resolving command names against instantiated commands
    pub fn from_config(routes: &RoutesConfig, commands: &CommandSet) -> Result<Self, ConfigError> {
        let mut table = Self::new();
        for (channel, names) in routes {
            let resolved = names
                .iter()
                .map(|name| {
                    commands
                        .get(name)
                        .cloned()
                        .ok_or_else(|| ConfigError::UnknownCommand {
                            channel: channel.clone(),
                            command: name.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            debug!(channel = %channel, commands = resolved.len(), "Added route");
            table.add(ChannelKey::parse(channel), resolved);
        }
        Ok(table)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    fn entry(&self, key: &ChannelKey) -> &[Arc<Command>] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Deduplicated, order-preserving command list for a channel.
    ///
    /// Direct messages consult their own id entry and `__direct_message__`.
    /// Other channels consult their name entry, their id entry, then `__all__`.
    pub fn effective_commands(&self, channel: &ChannelRef) -> Vec<Arc<Command>> {
        let sources: Vec<&[Arc<Command>]> = if channel.is_direct_message() {
            vec![
                self.entry(&ChannelKey::Explicit(channel.id.clone())),
                self.entry(&ChannelKey::DirectMessage),
            ]
        } else {
            vec![
                self.entry(&ChannelKey::Explicit(channel.name.clone())),
                self.entry(&ChannelKey::Explicit(channel.id.clone())),
                self.entry(&ChannelKey::AllChannels),
            ]
        };

        let mut effective: Vec<Arc<Command>> = Vec::new();
        for command in sources.into_iter().flatten() {
            if !effective.iter().any(|seen| Arc::ptr_eq(seen, command)) {
                effective.push(command.clone());
            }
        }
        effective
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::types::ChannelKind;

    fn command(name: &str) -> Arc<Command> {
        Arc::new(Command::builder(name).build())
    }

    fn names(commands: &[Arc<Command>]) -> Vec<&str> {
        commands.iter().map(|c| c.name()).collect()
    }

    fn general() -> ChannelRef {
        ChannelRef::new("C1", "general", ChannelKind::Public)
    }

    #[test]
    fn test_explicit_then_wildcard_deduplicated() {
        let (a, b, c) = (command("a"), command("b"), command("c"));
        let mut table = RoutingTable::new();
        table.add(ChannelKey::parse("general"), [b.clone(), a.clone()]);
        table.add(ChannelKey::parse("__all__"), [a.clone(), c.clone()]);

        let effective = table.effective_commands(&general());
        assert_eq!(names(&effective), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_wildcard_only() {
        let mut table = RoutingTable::new();
        table.add(ChannelKey::AllChannels, [command("a")]);

        let other = ChannelRef::new("C9", "random", ChannelKind::Private);
        assert_eq!(names(&table.effective_commands(&other)), vec!["a"]);
    }

    #[test]
    fn test_dm_never_consults_all() {
        let (a, dm) = (command("a"), command("dm"));
        let mut table = RoutingTable::new();
        table.add(ChannelKey::AllChannels, [a]);
        table.add(ChannelKey::DirectMessage, [dm]);

        let channel = ChannelRef::direct_message("D1");
        assert_eq!(names(&table.effective_commands(&channel)), vec!["dm"]);

        let mut only_all = RoutingTable::new();
        only_all.add(ChannelKey::AllChannels, [command("a")]);
        assert!(only_all.effective_commands(&channel).is_empty());
    }

    #[test]
    fn test_name_and_id_entries_both_apply() {
        let (a, b) = (command("a"), command("b"));
        let mut table = RoutingTable::new();
        table.add(ChannelKey::parse("C1"), [b.clone(), a.clone()]);
        table.add(ChannelKey::parse("general"), [a.clone()]);

        assert_eq!(names(&table.effective_commands(&general())), vec!["a", "b"]);
    }

    #[test]
    fn test_add_appends() {
        let mut table = RoutingTable::new();
        table.add(ChannelKey::parse("general"), [command("a")]);
        table.add(ChannelKey::parse("general"), [command("b")]);
        assert_eq!(
            names(&table.effective_commands(&general())),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_unrouted_channel_is_empty() {
        let table = RoutingTable::new();
        assert!(table.is_empty());
        assert!(table.effective_commands(&general()).is_empty());
    }

    #[test]
    fn test_from_config() {
        let mut commands = CommandSet::new();
        commands.insert("a".to_string(), command("a"));
        commands.insert("b".to_string(), command("b"));

        let mut routes = RoutesConfig::new();
        routes.insert("__all__".to_string(), vec!["a".to_string()]);
        routes.insert(
            "general".to_string(),
            vec!["b".to_string(), "a".to_string()],
        );

        let table = RoutingTable::from_config(&routes, &commands).unwrap();
        assert_eq!(names(&table.effective_commands(&general())), vec!["b", "a"]);
    }

    #[test]
    fn test_from_config_unknown_command() {
        let mut routes = RoutesConfig::new();
        routes.insert("general".to_string(), vec!["missing".to_string()]);

        let result = RoutingTable::from_config(&routes, &CommandSet::new());
        assert!(matches!(
            result,
            Err(ConfigError::UnknownCommand { command, .. }) if command == "missing"
        ));
    }
}
