//! Vidgraph - detection pipeline runner
//!
//! Command-line entry point for the graph-based media pipeline: decode a
//! video, batch frames, run detection and tracking, overlay results, and
//! re-encode to an output container.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::check::CheckCommand;
use commands::run::RunCommand;

#[derive(Parser)]
#[command(
    name = "vidgraph",
    version,
    about = "Graph-based video detection pipeline",
    after_help = "EXAMPLES:\n  \
                  # Run a detection pipeline described by a YAML config\n  \
                  vidgraph run --config configs/people-detect.yaml\n\n  \
                  # Validate the config and construct the graph without running it\n  \
                  vidgraph check --config configs/people-detect.yaml\n\n  \
                  # List the registered stage types\n  \
                  vidgraph stages"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a detection pipeline to completion
    Run(RunCommand),

    /// Validate configuration and build the graph without activating it
    Check(CheckCommand),

    /// List registered stage types
    Stages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep the stage listing clean; everything else logs at info by default.
    let log_level = match &cli.command {
        Commands::Stages => Level::WARN,
        _ => {
            if cli.verbose {
                Level::DEBUG
            } else {
                Level::INFO
            }
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Run(cmd) => cmd.execute().await,
        Commands::Check(cmd) => cmd.execute(),
        Commands::Stages => commands::stages::list_stages(),
    }
}
