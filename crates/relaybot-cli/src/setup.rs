//! CLI setup module
//!
//! Wires the file platform, the built-in commands and the routing table into
//! the listener and the offload worker.

use anyhow::{Context, Result};
use relaybot_core::channel::{BotIdentity, DirectorySource};
use relaybot_core::{
    Classifier, CommandContext, CommandSet, DirectoryCache, Dispatcher, DispatcherConfig,
    DurableQueue, Listener, OffloadWorker, RetryPolicy, RoutingTable,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::commands;
use crate::config::AppConfig;
use crate::platform::FilePlatform;

/// Everything shared by the listener and the worker
pub struct Engine {
    pub platform: Arc<FilePlatform>,
    pub classifier: Arc<Classifier>,
    pub dispatcher: Arc<Dispatcher>,
    pub queue: Arc<DurableQueue>,
}

/// Identity from the config when set, otherwise what the platform reports
pub async fn resolve_bot(config: &AppConfig, platform: &dyn DirectorySource) -> Result<BotIdentity> {
    if let Some(user_id) = &config.bot.user_id {
        return Ok(BotIdentity::new(user_id.clone()));
    }
    platform
        .bot_identity()
        .await
        .context("Failed to resolve the bot identity")
}

/// Instantiate every built-in command
pub fn build_commands(bot: &BotIdentity) -> Result<CommandSet> {
    let context = CommandContext::new(bot.clone());
    Ok(commands::catalog()?.instantiate(&context)?)
}

pub async fn prepare_engine(config: &AppConfig, platform: Arc<FilePlatform>) -> Result<Engine> {
    let bot = resolve_bot(config, platform.as_ref()).await?;
    let commands = build_commands(&bot)?;
    let routing = Arc::new(RoutingTable::from_config(&config.routes, &commands)?);

    let directory = Arc::new(DirectoryCache::new(platform.clone()));
    directory
        .refresh()
        .await
        .context("Failed to load the channel and user directory")?;
    let classifier = Arc::new(
        Classifier::new(directory, bot.user_id.clone())
            .ignore_bot_users(config.bot.ignore_bot_users),
    );

    let queue_path = config.queue_path()?;
    let queue = Arc::new(DurableQueue::open(&queue_path, config.queue.lock_wait())?);
    let dispatcher = Arc::new(
        Dispatcher::new(
            routing,
            platform.clone(),
            DispatcherConfig::from_settings(&config.bot, &bot),
        )
        .with_queue(queue.clone()),
    );

    info!(
        bot = %bot.user_id,
        commands = commands.len(),
        queue = %queue_path.display(),
        "Engine ready"
    );

    Ok(Engine {
        platform,
        classifier,
        dispatcher,
        queue,
    })
}

pub async fn listener(config: &AppConfig, events: Option<&Path>) -> Result<Listener> {
    let platform = Arc::new(
        FilePlatform::stdio(
            &config.platform.directory,
            events,
            config.platform.batch_size,
        )
        .await?,
    );
    let engine = prepare_engine(config, platform).await?;
    Ok(Listener::new(
        engine.platform,
        engine.classifier,
        engine.dispatcher,
        config.bot.poll_interval(),
    ))
}

pub async fn worker(config: &AppConfig) -> Result<OffloadWorker> {
    let platform = Arc::new(FilePlatform::output_only(&config.platform.directory));
    let engine = prepare_engine(config, platform).await?;
    Ok(OffloadWorker::new(
        engine.queue,
        engine.classifier,
        engine.dispatcher,
        engine.platform,
        RetryPolicy::from(&config.queue),
    ))
}
