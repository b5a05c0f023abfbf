use anyhow::Result;
use clap::{Parser, Subcommand};
use opshub::config::{self, LoggingConfig};
use opshub::core::triage::classify;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "opshub", about = "Chat-platform automation backend", version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the backend (default)
    Serve,
    /// Classify a message and print its triage category
    Triage {
        /// The message text to classify
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => opshub::run(config).await,
        Command::Triage { text } => {
            match classify(&text) {
                Some(category) => println!("{category}"),
                None => println!("(suppressed)"),
            }
            Ok(())
        }
    }
}

fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
