use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use almanac_core::Config;

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "almanac", version, about = "Almanac calendar tags and reminders")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Date tag management
    Tag {
        #[command(subcommand)]
        action: commands::tag::TagAction,
    },
    /// Reminder management and polling
    Reminder {
        #[command(subcommand)]
        action: commands::reminder::ReminderAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing(config: &Config) {
    // Logs go to stderr so stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let config = Config::load_or_default();
    init_tracing(&config);

    let result = match cli.command {
        Commands::Tag { action } => commands::tag::run(action, &config),
        Commands::Reminder { action } => commands::reminder::run(action, &config),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
