//! Configuration file loading and merging
//!
//! Loads user configuration from `~/.config/switchboard/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    PipelineConfig, PreviewQuality, SwitchboardConfig, TransmitterConfig, DEFAULT_GROUP,
    DEFAULT_PREVIEW_NAME, DEFAULT_PROGRAM_NAME,
};
use crate::error::{Result, SwitchboardError};
use crate::formats::PixelFormat;

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Program output settings
    #[serde(default)]
    pub program: ProgramSettings,

    /// Preview output settings
    #[serde(default)]
    pub preview: PreviewSettings,

    /// Ingestion settings
    #[serde(default)]
    pub sources: SourceSettings,
}

/// Program output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSettings {
    /// Name the program stream is announced under
    #[serde(default = "default_program_name")]
    pub name: String,

    /// Announce groups
    #[serde(default = "default_groups")]
    pub groups: Vec<String>,

    /// Outbound pixel format (bgra, rgba, bgrx, rgbx, i420, nv12)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output rate limit
    #[serde(default = "default_program_fps")]
    pub fps: u32,
}

/// Preview output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewSettings {
    /// Name the preview stream is announced under
    #[serde(default = "default_preview_name")]
    pub name: String,

    /// Announce groups
    #[serde(default = "default_groups")]
    pub groups: Vec<String>,

    /// Outbound pixel format
    #[serde(default = "default_format")]
    pub format: String,

    /// Output rate limit
    #[serde(default = "default_preview_fps")]
    pub fps: u32,

    /// Initial quality (low, medium, high)
    #[serde(default = "default_quality")]
    pub quality: String,
}

/// Ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// How long a source's last frame stays valid after its feed goes quiet
    #[serde(default = "default_staleness_ms")]
    pub staleness_ms: u64,

    /// Capacity of frame-ready and event notification channels
    #[serde(default = "default_notify_capacity")]
    pub notify_capacity: usize,
}

// Default value functions
fn default_program_name() -> String {
    DEFAULT_PROGRAM_NAME.to_string()
}

fn default_preview_name() -> String {
    DEFAULT_PREVIEW_NAME.to_string()
}

fn default_groups() -> Vec<String> {
    vec![DEFAULT_GROUP.to_string()]
}

fn default_format() -> String {
    "bgra".to_string()
}

fn default_program_fps() -> u32 {
    30
}

fn default_preview_fps() -> u32 {
    15
}

fn default_quality() -> String {
    "medium".to_string()
}

fn default_staleness_ms() -> u64 {
    2000
}

fn default_notify_capacity() -> usize {
    16
}

impl Default for ProgramSettings {
    fn default() -> Self {
        Self {
            name: default_program_name(),
            groups: default_groups(),
            format: default_format(),
            fps: default_program_fps(),
        }
    }
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            name: default_preview_name(),
            groups: default_groups(),
            format: default_format(),
            fps: default_preview_fps(),
            quality: default_quality(),
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            staleness_ms: default_staleness_ms(),
            notify_capacity: default_notify_capacity(),
        }
    }
}

fn parse_format(section: &str, value: &str) -> Result<PixelFormat> {
    value
        .parse()
        .map_err(|e| SwitchboardError::config(format!("[{}] format: {}", section, e)))
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("switchboard").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("switchboard")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/switchboard/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| SwitchboardError::config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| SwitchboardError::config(format!("Failed to parse config file: {}", e)))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SwitchboardError::config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SwitchboardError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)
            .map_err(|e| SwitchboardError::config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Resolve the file's string settings into a typed runtime config
    pub fn to_config(&self) -> Result<SwitchboardConfig> {
        let quality: PreviewQuality = self
            .preview
            .quality
            .parse()
            .map_err(|e: SwitchboardError| SwitchboardError::config(format!("[preview] {}", e)))?;

        let pipeline = PipelineConfig {
            program_fps: self.program.fps,
            preview_fps: self.preview.fps,
            preview_quality: quality,
            program: TransmitterConfig::new(&self.program.name)
                .with_groups(self.program.groups.iter().cloned())
                .with_format(parse_format("program", &self.program.format)?),
            preview: TransmitterConfig::new(&self.preview.name)
                .with_groups(self.preview.groups.iter().cloned())
                .with_format(parse_format("preview", &self.preview.format)?),
        };

        Ok(SwitchboardConfig {
            pipeline,
            staleness: Duration::from_millis(self.sources.staleness_ms),
            notify_capacity: self.sources.notify_capacity,
        })
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# Switchboard Configuration

[program]
# Name and groups the program output is announced under
name = "Switchboard Program"
groups = ["Switchboard"]

# Outbound pixel format: bgra, rgba, bgrx, rgbx, i420, nv12
format = "bgra"

# Output rate limit in frames per second
fps = 30

[preview]
name = "Switchboard Preview"
groups = ["Switchboard"]
format = "bgra"
fps = 15

# Preview quality: low (320x240), medium (640x480), high (640x480)
quality = "medium"

[sources]
# A source's last frame is dropped from output this long after its feed goes quiet
staleness_ms = 2000

# Capacity of frame-ready and event notification channels
notify_capacity = 16
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();
        assert_eq!(config.program.name, "Switchboard Program");
        assert_eq!(config.preview.quality, "medium");
        assert_eq!(config.sources.staleness_ms, 2000);
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = sample_config();
        let config: ConfigFile = toml::from_str(&sample).unwrap();
        assert_eq!(config.program.fps, 30);
        assert_eq!(config.preview.fps, 15);
    }

    #[test]
    fn test_sample_matches_defaults() {
        let from_sample: ConfigFile = toml::from_str(&sample_config()).unwrap();
        assert_eq!(
            from_sample.to_config().unwrap(),
            ConfigFile::default().to_config().unwrap()
        );
        assert_eq!(
            ConfigFile::default().to_config().unwrap(),
            SwitchboardConfig::default()
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ConfigFile = toml::from_str("[preview]\nquality = \"low\"\n").unwrap();
        let resolved = config.to_config().unwrap();
        assert_eq!(resolved.pipeline.preview_quality, PreviewQuality::Low);
        assert_eq!(resolved.pipeline.program_fps, 30);
    }

    #[test]
    fn test_bad_values_rejected() {
        let config: ConfigFile = toml::from_str("[preview]\nquality = \"ultra\"\n").unwrap();
        assert!(config.to_config().is_err());

        let config: ConfigFile = toml::from_str("[program]\nformat = \"yuyv\"\n").unwrap();
        let err = config.to_config().unwrap_err();
        assert!(err.to_string().contains("[program]"));
    }
}
