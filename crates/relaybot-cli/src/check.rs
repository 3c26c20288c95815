//! `relaybot check` - validate the configuration and print what the bot would serve

use anyhow::Result;
use colored::Colorize;
use relaybot_core::{ChannelKey, CommandSet, RoutingTable};
use relaybot_storage::TaskQueueStore;

use crate::config::AppConfig;
use crate::platform::FilePlatform;
use crate::setup;

pub async fn run(config: &AppConfig) -> Result<()> {
    let platform = FilePlatform::output_only(&config.platform.directory);
    let bot = setup::resolve_bot(config, &platform).await?;
    let commands = setup::build_commands(&bot)?;
    let routing = RoutingTable::from_config(&config.routes, &commands)?;

    println!("{} {}", "Bot:".bold(), bot.mention());
    print_commands(&commands);
    print_routes(config);

    if routing.is_empty() {
        println!("\n{}", "No routes configured, the bot will not answer anything".yellow());
    }

    println!("\n{}", "Queue:".bold());
    println!("  ack_policy   {}", config.queue.ack_policy);
    println!("  max_attempts {}", config.queue.max_attempts);
    let queue_path = config.queue_path()?;
    if queue_path.exists() {
        let store = TaskQueueStore::open(&queue_path, config.queue.lock_wait())?;
        println!(
            "  {} ({} pending, {} in flight)",
            queue_path.display(),
            store.pending_len()?,
            store.in_flight_len()?
        );
    } else {
        println!("  {} (not created yet)", queue_path.display());
    }

    println!("\n{}", "Configuration OK".green().bold());
    Ok(())
}

fn print_commands(commands: &CommandSet) {
    println!("\n{}", "Commands:".bold());
    for (name, command) in commands {
        println!("  {}", name.cyan());
        for trigger in command.triggers().iter() {
            println!("    {} {}", trigger.kind().as_str().dimmed(), trigger.name());
        }
    }
}

fn print_routes(config: &AppConfig) {
    println!("\n{}", "Routes:".bold());
    for (channel, names) in &config.routes {
        let label = match ChannelKey::parse(channel) {
            ChannelKey::Explicit(_) => channel.clone(),
            key => format!("{} ({})", channel, describe(&key)),
        };
        println!("  {} -> {}", label, names.join(", "));
    }
}

fn describe(key: &ChannelKey) -> &'static str {
    match key {
        ChannelKey::AllChannels => "every non-direct channel",
        ChannelKey::DirectMessage => "every direct message",
        ChannelKey::Explicit(_) => "channel",
    }
}
