use colored::Colorize;

pub fn handle_error(err: anyhow::Error) -> ! {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let msg = format!("{:#}", err).to_lowercase();

    if msg.contains("config file not found") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Create ~/.config/relaybot/config.toml, or point to one with:");
        eprintln!("  {} relaybot --config <path> check", "$".dimmed());
    }

    if msg.contains("ack_policy") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Choose when queued tasks are acknowledged:");
        eprintln!("  {} [queue]", "#".dimmed());
        eprintln!("  {} ack_policy = \"after_process\"", "#".dimmed());
    }

    if msg.contains("unknown command") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  List the commands and routes the bot knows about with:");
        eprintln!("  {} relaybot check", "$".dimmed());
    }

    if msg.contains("directory file") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Check `platform.directory` in the config file.");
    }

    std::process::exit(1);
}
