mod check;
mod cli;
mod commands;
mod completions;
mod config;
mod error;
mod paths;
mod platform;
mod setup;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use config::AppConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        completions::generate_completions(shell);
        return;
    }

    // stdout carries bot output, so logs always go to the file
    let _guard = match init_logging(cli.verbose) {
        Ok(guard) => guard,
        Err(err) => error::handle_error(err),
    };

    if let Err(err) = run(cli).await {
        error::handle_error(err);
    }
}

fn init_logging(verbose: bool) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = paths::log_dir()?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "relaybot.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .init();

    Ok(guard)
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Listen(args) => {
            let listener = setup::listener(&config, args.events.as_deref()).await?;
            let stats = listener.run(shutdown_signal()).await;
            info!(?stats, "Listener stopped");
        }
        Commands::Worker => {
            let worker = setup::worker(&config).await?;
            worker.run(shutdown_signal()).await;
            info!("Worker stopped");
        }
        Commands::Check => check::run(&config).await?,
        Commands::Completions { shell } => completions::generate_completions(shell),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
