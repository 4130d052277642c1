//! forumsync CLI
//!
//! Command-line client for forum live updates: watch presence, typing and
//! content notifications, or simulate typing in a topic.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod logging;
mod output;

use commands::SessionArgs;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "forumsync")]
#[command(about = "forumsync - live forum updates from the terminal")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print live updates until Ctrl-C
    Watch {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Simulate typing in a topic, then let the idle stop fire
    Typing {
        /// Topic (post) ID to type in
        topic: String,
        /// How long to keep typing
        #[arg(long, default_value_t = 5)]
        duration_secs: u64,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (server_url, typing_timeout_ms, log_file, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Config { command } => match command.unwrap_or(ConfigCommands::Show) {
            ConfigCommands::Show => commands::config::show(config_path, &output),
            ConfigCommands::Set { key, value } => {
                commands::config::set(key, value, config_path, &output)
            }
        },
        Commands::Watch { session } => {
            let config = commands::load_config(config_path)?;
            logging::init(&config);
            commands::watch::run(&config, session, &output).await
        }
        Commands::Typing {
            topic,
            duration_secs,
            session,
        } => {
            let config = commands::load_config(config_path)?;
            logging::init(&config);
            commands::typing::run(&config, session, topic, duration_secs, &output).await
        }
    }
}
