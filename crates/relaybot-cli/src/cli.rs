use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "relaybot")]
#[command(version, about = "Relaybot - chat command router with an offload queue")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ~/.config/relaybot/config.toml)
    #[arg(long, global = true, env = "RELAYBOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read platform events and answer them, offloading slow work
    Listen(ListenArgs),

    /// Process offloaded tasks from the queue
    Worker,

    /// Validate the configuration, commands and routes, then exit
    Check,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ListenArgs {
    /// Read events from this file instead of stdin (one JSON event per line)
    #[arg(long)]
    pub events: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_listen_with_events() {
        let cli = Cli::try_parse_from([
            "relaybot",
            "--config",
            "/tmp/bot.toml",
            "listen",
            "--events",
            "events.jsonl",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/bot.toml")));
        match cli.command {
            Commands::Listen(args) => assert_eq!(args.events, Some(PathBuf::from("events.jsonl"))),
            _ => panic!("expected listen"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["relaybot", "worker", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Worker));
    }
}
