//! umlsync CLI - keeps `PlantUML` diagrams in markdown in sync with rendered assets.
//!
//! Provides commands for:
//! - `sync`: Annotate diagrams, render changed ones and remove orphaned assets
//! - `check`: Report what `sync` would change without touching anything

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{CheckArgs, SyncArgs};
use error::CliError;
use output::Output;

/// umlsync - incremental `PlantUML` rendering for markdown.
#[derive(Parser)]
#[command(name = "umlsync", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Update documents and rendered diagrams.
    Sync(SyncArgs),
    /// Exit non-zero if `sync` would change anything.
    Check(CheckArgs),
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Self::Sync(args) => args.source.verbose,
            Self::Check(args) => args.source.verbose,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.command.verbose() {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli.command, &output) {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

fn run(command: Commands, output: &Output) -> Result<(), CliError> {
    let rt = tokio::runtime::Runtime::new()?;
    match command {
        Commands::Sync(args) => rt.block_on(args.execute(output)),
        Commands::Check(args) => rt.block_on(args.execute(output)),
    }
}
