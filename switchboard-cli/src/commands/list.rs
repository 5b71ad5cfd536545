//! List sources command

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use switchboard_core::ingest::{PatternDirectory, SourceDirectory};

/// Arguments for the list-sources command
#[derive(Args)]
pub struct ListArgs {
    /// Print machine-readable JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct SourceEntry<'a> {
    id: &'a str,
    name: &'a str,
}

/// List available sources
pub async fn list_sources(args: ListArgs) -> Result<()> {
    let directory = PatternDirectory::with_defaults();
    let sources = directory.list_sources();

    if args.json {
        let entries: Vec<SourceEntry<'_>> = sources
            .iter()
            .map(|s| SourceEntry {
                id: &s.id,
                name: &s.display_name,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Switchboard - Available Sources\n");

    if sources.is_empty() {
        println!("No sources found.");
        return Ok(());
    }

    println!("{:<12} {:<30}", "ID", "Name");
    println!("{}", "-".repeat(42));
    for source in &sources {
        println!("{:<12} {:<30}", source.id, truncate(&source.display_name, 30));
    }

    println!("\nUse 'switchboard run --source <ID>' to put a source on air.");
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 3).collect();
        format!("{}...", head)
    }
}
