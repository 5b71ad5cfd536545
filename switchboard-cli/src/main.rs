//! Switchboard CLI
//!
//! Live video-source switcher: many sources in, one program and one
//! preview stream out.
//!
//! # Usage
//!
//! ```bash
//! # List available sources
//! switchboard list-sources
//!
//! # Switch between the test sources, rotating every 5 seconds
//! switchboard run --cycle 5 --program-addr 127.0.0.1:9000
//!
//! # Write a starter config file
//! switchboard config init
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Switchboard - live video-source switcher
#[derive(Parser)]
#[command(name = "switchboard")]
#[command(version)]
#[command(about = "Live video-source switcher with program and preview outputs", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available video sources
    #[command(alias = "ls")]
    ListSources(commands::ListArgs),

    /// Ingest sources and drive the program and preview outputs
    Run(commands::RunArgs),

    /// Manage the configuration file
    Config(commands::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("switchboard={}", level).parse()?),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::ListSources(args) => commands::list_sources(args).await?,
        Commands::Run(args) => commands::run(args).await?,
        Commands::Config(args) => commands::config(args).await?,
    }

    Ok(())
}
