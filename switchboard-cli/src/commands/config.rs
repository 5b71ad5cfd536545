//! Config command - manage configuration files

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use switchboard_core::config::{sample_config, ConfigFile};

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the path to the config file
    Path,

    /// Show the effective configuration and any warnings
    Show,

    /// Generate a default config file
    Init {
        /// Force overwrite if file exists
        #[arg(short, long)]
        force: bool,
    },

    /// Print a sample configuration to stdout
    Sample,
}

/// Run config subcommand
pub async fn config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Path => {
            let path = ConfigFile::default_path();
            println!("{}", path.display());
            if path.exists() {
                println!("(file exists)");
            } else {
                println!("(file does not exist)");
            }
        }
        ConfigCommand::Show => {
            let path = ConfigFile::default_path();
            if path.exists() {
                println!("Configuration file: {}\n", path.display());
            } else {
                println!("No configuration file found at: {}", path.display());
                println!("Using default settings. Create a config file with:");
                println!("  switchboard config init\n");
            }

            let file = ConfigFile::load_from(path).context("Failed to load config file")?;
            let config = file.to_config().context("Invalid configuration")?;
            let p = &config.pipeline;

            println!("Program:");
            println!("  Name:    {}", p.program.name);
            println!("  Groups:  {}", p.program.groups.join(", "));
            println!("  Format:  {}", p.program.format);
            println!("  Rate:    {} fps", p.program_fps);
            println!("Preview:");
            println!("  Name:    {}", p.preview.name);
            println!("  Groups:  {}", p.preview.groups.join(", "));
            println!("  Format:  {}", p.preview.format);
            println!("  Rate:    {} fps", p.preview_fps);
            let (width, height) = p.preview_quality.dimensions();
            println!("  Quality: {} ({}x{})", p.preview_quality, width, height);
            println!("Sources:");
            println!("  Stale after: {} ms", config.staleness.as_millis());

            match config.validate_strict() {
                Ok(warnings) if warnings.is_empty() => {}
                Ok(warnings) => {
                    println!("\nWarnings:");
                    for warning in warnings {
                        println!("  - {}", warning);
                    }
                }
                Err(e) => {
                    println!("\nError: {}", e);
                    if let Some(hint) = e.user_hint() {
                        println!("Hint: {}", hint);
                    }
                }
            }
        }
        ConfigCommand::Init { force } => {
            let path = ConfigFile::default_path();

            if path.exists() && !force {
                println!("Configuration file already exists: {}", path.display());
                println!();
                println!("Use --force to overwrite, or edit the existing file.");
                return Ok(());
            }

            // Create parent directory if needed
            if let Some(parent) = path.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent).context("Failed to create config directory")?;
                }
            }

            std::fs::write(&path, sample_config()).context("Failed to write config file")?;

            println!("Created configuration file: {}", path.display());
            println!();
            println!("Edit this file to set output names, rates and preview quality.");
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}
