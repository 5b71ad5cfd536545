//! Run command - ingest sources and drive both outputs

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::config::{ConfigFile, PreviewQuality, TransmitterConfig};
use switchboard_core::ingest::PatternDirectory;
use switchboard_core::output::{NullSink, TcpSink};
use switchboard_core::{OutputPath, Switchboard, SwitcherEvent, Transmitter};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Arguments for the run command
#[derive(Args)]
pub struct RunArgs {
    /// Source to put on air first (defaults to the first listed)
    #[arg(short, long)]
    source: Option<String>,

    /// Rotate through all sources every N seconds
    #[arg(long, value_name = "SECS")]
    cycle: Option<u64>,

    /// Stream the program output to this TCP receiver (host:port)
    #[arg(long)]
    program_addr: Option<String>,

    /// Stream the preview output to this TCP receiver (host:port)
    #[arg(long)]
    preview_addr: Option<String>,

    /// Preview quality (low, medium, high); overrides the config file
    #[arg(short, long)]
    quality: Option<String>,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print status every N seconds (0 = never)
    #[arg(long, default_value = "5", value_name = "SECS")]
    status_every: u64,

    /// Look for new sources every N seconds (0 = never)
    #[arg(long, default_value = "1", value_name = "SECS")]
    rescan: u64,
}

/// Open one output: TCP when an address is given, otherwise discard
async fn open_output(config: TransmitterConfig, addr: Option<&str>) -> Result<Transmitter> {
    let name = config.name.clone();
    let transmitter = match addr {
        Some(addr) => Transmitter::start(config, TcpSink::new(addr)).await,
        None => Transmitter::start(config, NullSink::default()).await,
    };
    transmitter.with_context(|| format!("Failed to open output '{}'", name))
}

/// Start switching until Ctrl+C
pub async fn run(args: RunArgs) -> Result<()> {
    println!("Switchboard - Live Switching\n");

    let file = match &args.config {
        Some(path) => ConfigFile::load_from(path.clone()).context("Failed to load config file")?,
        None => ConfigFile::load_or_default(),
    };
    let mut config = file.to_config().context("Invalid configuration")?;
    if let Some(quality) = &args.quality {
        let quality: PreviewQuality = quality.parse()?;
        config = config.with_preview_quality(quality);
    }

    let program = open_output(config.pipeline.program.clone(), args.program_addr.as_deref()).await?;
    let preview = open_output(config.pipeline.preview.clone(), args.preview_addr.as_deref()).await?;

    println!("Configuration:");
    println!(
        "  Program:  '{}' {} @ {} fps -> {}",
        config.pipeline.program.name,
        config.pipeline.program.format,
        config.pipeline.program_fps,
        args.program_addr.as_deref().unwrap_or("(discard)")
    );
    println!(
        "  Preview:  '{}' {} {} @ {} fps -> {}",
        config.pipeline.preview.name,
        config.pipeline.preview.format,
        config.pipeline.preview_quality,
        config.pipeline.preview_fps,
        args.preview_addr.as_deref().unwrap_or("(discard)")
    );
    println!("  Stale after: {} ms", config.staleness.as_millis());
    println!();

    let directory = Arc::new(PatternDirectory::with_defaults());
    let board = Switchboard::start(directory, config, program, preview)
        .context("Failed to start switchboard")?;
    let mut events = board.subscribe_events();

    let started = board.start_all();
    let ids: Vec<String> = board.switcher().sources();
    if started == 0 || ids.is_empty() {
        board.shutdown().await;
        anyhow::bail!("No sources could be started");
    }

    let first = args.source.clone().unwrap_or_else(|| ids[0].clone());
    board
        .select_source(&first)
        .with_context(|| format!("Cannot put '{}' on air", first))?;
    println!("On air: {}", first);
    println!("Press Ctrl+C to stop...\n");

    // Rotation is off unless --cycle is given; first ticks fire immediately
    let cycle_secs = args.cycle.filter(|secs| *secs > 0);
    let mut cycle = tokio::time::interval(Duration::from_secs(cycle_secs.unwrap_or(3600)));
    cycle.tick().await;
    let mut status = tokio::time::interval(Duration::from_secs(args.status_every.max(1)));
    status.tick().await;
    let mut rescan = tokio::time::interval(Duration::from_secs(args.rescan.max(1)));
    rescan.tick().await;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("\nReceived interrupt signal...");
                break;
            }
            _ = cycle.tick(), if cycle_secs.is_some() => {
                let ids = board.switcher().sources();
                if let Some(next) = next_source(&ids, board.active_source().as_deref()) {
                    match board.select_source(next) {
                        Ok(()) => println!("On air: {}", next),
                        Err(e) => warn!("Could not switch to {}: {}", next, e),
                    }
                }
            }
            _ = rescan.tick(), if args.rescan > 0 => {
                let before = board.switcher().sources().len();
                board.start_all();
                let after = board.switcher().sources().len();
                if after > before {
                    info!("{} new source(s) available", after - before);
                }
            }
            _ = status.tick(), if args.status_every > 0 => {
                println!("{}\n", board.status());
            }
            event = events.recv() => match event {
                Ok(SwitcherEvent::TransmitterClosed { path, reason }) => {
                    warn!("{} output closed: {}", path, reason);
                    reopen(&board, &args, path).await;
                }
                Ok(event) => info!("{:?}", event),
                Err(RecvError::Lagged(n)) => warn!("Missed {} events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    println!("Stopping...");
    board.shutdown().await;
    println!("Stopped.");
    Ok(())
}

/// Source after `current` in `ids`, wrapping around
fn next_source<'a>(ids: &'a [String], current: Option<&str>) -> Option<&'a str> {
    if ids.is_empty() {
        return None;
    }
    let next = current
        .and_then(|current| ids.iter().position(|id| id == current))
        .map_or(0, |position| (position + 1) % ids.len());
    Some(ids[next].as_str())
}

/// Try once to replace a closed output with a fresh session
async fn reopen(board: &Switchboard, args: &RunArgs, path: OutputPath) {
    let (config, addr) = match path {
        OutputPath::Program => (
            board.config().pipeline.program.clone(),
            args.program_addr.as_deref(),
        ),
        OutputPath::Preview => (
            board.config().pipeline.preview.clone(),
            args.preview_addr.as_deref(),
        ),
    };

    match open_output(config, addr).await {
        Ok(transmitter) => {
            board.replace_transmitter(path, transmitter).await;
            println!("Reconnected {} output", path);
        }
        Err(e) => warn!("Could not reconnect {} output: {:#}", path, e),
    }
}
