//! Built-in commands
//!
//! Every command the bot ships with is registered here by name; `[routes]`
//! in the config file then decides which channels get which commands.

use relaybot_core::trigger::Invocation;
use relaybot_core::{
    Attachment, CommandBuilder, CommandCatalog, CommandContext, RegistrationError, Response,
};

/// Catalog with every built-in command
pub fn catalog() -> Result<CommandCatalog, RegistrationError> {
    let mut catalog = CommandCatalog::new();
    catalog
        .register("example", example)?
        .register("example2", example2)?;
    Ok(catalog)
}

fn first_arg(invocation: &Invocation) -> String {
    invocation.args.positional(0).unwrap_or_default().to_string()
}

fn example(builder: &mut CommandBuilder, context: &CommandContext) -> Result<(), RegistrationError> {
    let mention = context.bot_mention();

    builder.on_message("test", "(?i)test (.+)", |invocation| async move {
        Ok(Some(Response::text(format!(
            "Test value is: {}",
            first_arg(&invocation)
        ))))
    })?;

    builder.on_message(
        "queue",
        &format!("(?i){} queue (.+)", regex::escape(&mention)),
        |invocation| async move {
            if !invocation.is_deferred() {
                return Ok(Some(Response::offload("")));
            }
            Ok(Some(
                Response::text(format!(
                    "This value *{}* came from a worker",
                    first_arg(&invocation)
                ))
                .in_thread(),
            ))
        },
    )?;

    builder.with_help(vec![
        Attachment::new(
            "Example Commands",
            format!("- test [some_text]\n- {mention} queue [some_text]"),
        )
        .with_color("#2f7a30")
        .with_markdown(&["text", "pretext"]),
    ]);
    Ok(())
}

fn example2(
    builder: &mut CommandBuilder,
    _context: &CommandContext,
) -> Result<(), RegistrationError> {
    builder.on_message("example2", "(?i)^example2$", |_invocation| async move {
        Ok(Some(Response::text("This is from example 2")))
    })?;

    builder.on_file_share("csv", "(?i)^csv$", "(.+)", |invocation| async move {
        Ok(Some(
            Response::text(format!("Got your file {}", first_arg(&invocation))).with_reaction("eyes"),
        ))
    })?;

    builder.with_help(vec![
        Attachment::new("Example2 Commands", "- example2\n- share a .csv file")
            .with_color("#FF0000")
            .with_markdown(&["text", "pretext"]),
    ]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaybot_core::channel::traits::mock::MockPlatform;
    use relaybot_core::channel::{BotIdentity, ChannelKind, EventPayload, FileMeta, Subject};
    use relaybot_core::offload::queue::mock::MemoryQueue;
    use relaybot_core::{
        ChannelKey, ChannelRef, DispatchOutcome, Dispatcher, DispatcherConfig, Interaction,
        RoutingTable, UserRef,
    };
    use std::sync::Arc;

    fn context() -> CommandContext {
        CommandContext::new(BotIdentity::new("UBOT"))
    }

    fn message(text: &str) -> Interaction {
        Interaction {
            payload: EventPayload::Message { text: text.into() },
            channel: ChannelRef::new("C1", "general", ChannelKind::Public),
            user: UserRef::new("U1", "alice"),
            ts: "100.0".into(),
            thread_ts: None,
            is_deferred: false,
        }
    }

    async fn run(text: &str, deferred: bool) -> Option<Response> {
        let commands = catalog().unwrap().instantiate(&context()).unwrap();
        let mut interaction = message(text);
        if deferred {
            interaction = interaction.into_deferred();
        }
        for command in commands.values() {
            if let Some(found) = command.find_match(&interaction.subject()) {
                let handler = found.trigger.handler().clone();
                return handler(found.invocation(interaction)).await.unwrap();
            }
        }
        None
    }

    #[test]
    fn test_catalog_instantiates() {
        let catalog = catalog().unwrap();
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["example", "example2"]);

        let commands = catalog.instantiate(&context()).unwrap();
        assert_eq!(commands["example"].triggers().len(), 2);
        assert_eq!(commands["example2"].triggers().len(), 2);

        let help = commands["example"].help().unwrap();
        assert_eq!(help[0].color.as_deref(), Some("#2f7a30"));
        assert!(help[0].text.as_deref().unwrap().contains("<@UBOT> queue"));
    }

    #[tokio::test]
    async fn test_test_trigger_is_case_insensitive() {
        let response = run("TEST hello world", false).await.unwrap();
        assert_eq!(response.text, "Test value is: hello world");
    }

    #[tokio::test]
    async fn test_queue_trigger_offloads_then_answers_in_thread() {
        let live = run("<@UBOT> queue abc", false).await.unwrap();
        assert!(live.requires_offload);
        assert!(live.text.is_empty());

        let deferred = run("<@UBOT> queue abc", true).await.unwrap();
        assert!(!deferred.requires_offload);
        assert!(deferred.thread_reply);
        assert_eq!(deferred.text, "This value *abc* came from a worker");
    }

    #[tokio::test]
    async fn test_example2_is_exact() {
        assert_eq!(
            run("example2", false).await.unwrap().text,
            "This is from example 2"
        );
        assert!(run("example2 please", false).await.is_none());
    }

    #[test]
    fn test_csv_file_share_matches() {
        let commands = catalog().unwrap().instantiate(&context()).unwrap();
        let file = FileMeta {
            id: "F1".into(),
            name: "report.csv".into(),
            filetype: "csv".into(),
            ..Default::default()
        };
        let subject = Subject::FileShare {
            filetype: &file.filetype,
            name: &file.name,
        };
        let found = commands["example2"].find_match(&subject).unwrap();
        assert_eq!(found.args.positional(0), Some("report.csv"));
        assert!(commands["example"].find_match(&subject).is_none());
    }

    #[tokio::test]
    async fn test_queue_trigger_through_dispatcher() {
        let platform = Arc::new(MockPlatform::new("UBOT"));
        let queue = Arc::new(MemoryQueue::new());
        let commands = catalog().unwrap().instantiate(&context()).unwrap();
        let mut routing = RoutingTable::new();
        routing.add(ChannelKey::AllChannels, commands.values().cloned());

        let dispatcher = Dispatcher::new(
            Arc::new(routing),
            platform.clone(),
            DispatcherConfig::new(&BotIdentity::new("UBOT")),
        )
        .with_queue(queue.clone());

        let outcome = dispatcher.handle(message("<@UBOT> queue abc")).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Offloaded { .. }));
        assert_eq!(queue.pending().await.len(), 1);
    }
}
