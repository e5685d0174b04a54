mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "rosterline",
    version,
    about = "Batch onboarding engine for hierarchical roster data"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a batch file and print one verdict per line
    Run {
        /// Path to a JSON file holding an array of requests
        batch: PathBuf,
        /// Path to engine config YAML (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate engine configuration and the identity store
    Check {
        /// Path to engine config YAML
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { batch, config } => commands::run::execute(&batch, config.as_deref()).await,
        Commands::Check { config } => commands::check::execute(&config).await,
    }
}
