//! Configuration types for Switchboard
//!
//! Provides preview quality levels, transmitter settings and runtime
//! configuration for the output pipeline and ingestion.

mod file;

pub use file::{sample_config, ConfigFile};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, SwitchboardError};
use crate::formats::PixelFormat;

/// Default name announced for the program output
pub const DEFAULT_PROGRAM_NAME: &str = "Switchboard Program";
/// Default name announced for the preview output
pub const DEFAULT_PREVIEW_NAME: &str = "Switchboard Preview";
/// Default group both outputs are announced in
pub const DEFAULT_GROUP: &str = "Switchboard";

/// Preview quality level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreviewQuality {
    /// 320x240
    Low,
    /// 640x480 (default)
    #[default]
    Medium,
    /// 640x480
    High,
}

impl PreviewQuality {
    /// Preview resolution for this quality level
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Low => (320, 240),
            Self::Medium | Self::High => (640, 480),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for PreviewQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PreviewQuality {
    type Err = SwitchboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(SwitchboardError::InvalidQuality(s.to_string())),
        }
    }
}

/// Preview output geometry, derived from the quality level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewConfig {
    pub quality: PreviewQuality,
    pub width: u32,
    pub height: u32,
}

impl PreviewConfig {
    pub fn from_quality(quality: PreviewQuality) -> Self {
        let (width, height) = quality.dimensions();
        Self {
            quality,
            width,
            height,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self::from_quality(PreviewQuality::default())
    }
}

impl std::fmt::Display for PreviewConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}x{}", self.quality, self.width, self.height)
    }
}

/// Settings for one outbound transmission session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmitterConfig {
    /// Name the stream is announced under
    pub name: String,
    /// Groups the stream is announced in
    pub groups: Vec<String>,
    /// Pixel format the transport expects
    pub format: PixelFormat,
}

impl TransmitterConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: vec![DEFAULT_GROUP.to_string()],
            format: PixelFormat::Bgra,
        }
    }

    pub fn program() -> Self {
        Self::new(DEFAULT_PROGRAM_NAME)
    }

    pub fn preview() -> Self {
        Self::new(DEFAULT_PREVIEW_NAME)
    }

    /// Replace the announce groups
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Set the outbound pixel format
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }
}

/// Output pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Program output rate limit
    pub program_fps: u32,
    /// Preview output rate limit
    pub preview_fps: u32,
    /// Initial preview quality
    pub preview_quality: PreviewQuality,
    /// Program transmitter settings
    pub program: TransmitterConfig,
    /// Preview transmitter settings
    pub preview: TransmitterConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            program_fps: 30,
            preview_fps: 15,
            preview_quality: PreviewQuality::default(),
            program: TransmitterConfig::program(),
            preview: TransmitterConfig::preview(),
        }
    }
}

impl PipelineConfig {
    pub fn program_interval(&self) -> Duration {
        fps_interval(self.program_fps)
    }

    pub fn preview_interval(&self) -> Duration {
        fps_interval(self.preview_fps)
    }
}

fn fps_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1) as f64)
}

/// Complete runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchboardConfig {
    /// Output pipeline settings
    pub pipeline: PipelineConfig,
    /// Age after which a source's last frame is no longer served
    pub staleness: Duration,
    /// Capacity of the notification channels (frame-ready, events)
    pub notify_capacity: usize,
}

impl Default for SwitchboardConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            staleness: Duration::from_millis(2000),
            notify_capacity: 16,
        }
    }
}

impl SwitchboardConfig {
    /// Set the program output rate
    pub fn with_program_fps(mut self, fps: u32) -> Self {
        self.pipeline.program_fps = fps;
        self
    }

    /// Set the preview output rate
    pub fn with_preview_fps(mut self, fps: u32) -> Self {
        self.pipeline.preview_fps = fps;
        self
    }

    /// Set the initial preview quality
    pub fn with_preview_quality(mut self, quality: PreviewQuality) -> Self {
        self.pipeline.preview_quality = quality;
        self
    }

    /// Set the program transmitter settings
    pub fn with_program(mut self, program: TransmitterConfig) -> Self {
        self.pipeline.program = program;
        self
    }

    /// Set the preview transmitter settings
    pub fn with_preview(mut self, preview: TransmitterConfig) -> Self {
        self.pipeline.preview = preview;
        self
    }

    /// Set the staleness window
    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    /// Validate configuration and return warnings
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let p = &self.pipeline;

        if p.program_fps > 60 {
            warnings.push(format!(
                "Program rate {}fps is above what most network receivers handle well",
                p.program_fps
            ));
        }

        if p.preview_fps > p.program_fps {
            warnings.push(format!(
                "Preview rate {}fps exceeds program rate {}fps; preview only needs monitoring quality",
                p.preview_fps, p.program_fps
            ));
        }

        if self.staleness < p.program_interval() * 2 {
            warnings.push(format!(
                "Staleness window {}ms is shorter than two program frames; sources may flicker out",
                self.staleness.as_millis()
            ));
        }

        if p.program.format.is_yuv() || p.preview.format.is_yuv() {
            warnings.push(
                "YUV output formats are converted through RGB and are not lossless".to_string(),
            );
        }

        warnings
    }

    /// Validate configuration, returning an error for invalid settings
    pub fn validate_strict(&self) -> Result<Vec<String>> {
        let p = &self.pipeline;

        if p.program_fps == 0 || p.preview_fps == 0 {
            return Err(SwitchboardError::config("Output rates must be at least 1fps"));
        }

        if self.staleness.is_zero() {
            return Err(SwitchboardError::config("Staleness window must be non-zero"));
        }

        if self.notify_capacity == 0 {
            return Err(SwitchboardError::config("Notification capacity must be non-zero"));
        }

        for tx in [&p.program, &p.preview] {
            if tx.name.trim().is_empty() {
                return Err(SwitchboardError::config("Output names must not be empty"));
            }
            if tx.format == PixelFormat::P010 {
                return Err(SwitchboardError::config(format!(
                    "Output '{}' cannot use {}; it is not a convertible format",
                    tx.name, tx.format
                )));
            }
        }

        if p.program.name == p.preview.name {
            return Err(SwitchboardError::config(format!(
                "Program and preview are both announced as '{}'",
                p.program.name
            )));
        }

        Ok(self.validate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_dimensions() {
        assert_eq!(PreviewQuality::Low.dimensions(), (320, 240));
        assert_eq!(PreviewQuality::Medium.dimensions(), (640, 480));
        assert_eq!(PreviewQuality::High.dimensions(), (640, 480));
    }

    #[test]
    fn test_preview_quality_parse() {
        assert_eq!("LOW".parse::<PreviewQuality>().unwrap(), PreviewQuality::Low);
        assert_eq!(" high ".parse::<PreviewQuality>().unwrap(), PreviewQuality::High);
        let err = "ultra".parse::<PreviewQuality>().unwrap_err();
        assert!(matches!(err, SwitchboardError::InvalidQuality(ref s) if s == "ultra"));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = SwitchboardConfig::default();
        let warnings = config.validate_strict().unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn test_zero_fps_rejected() {
        let config = SwitchboardConfig::default().with_program_fps(0);
        assert!(config.validate_strict().is_err());
    }

    #[test]
    fn test_same_output_names_rejected() {
        let config = SwitchboardConfig::default()
            .with_preview(TransmitterConfig::new(DEFAULT_PROGRAM_NAME));
        assert!(config.validate_strict().is_err());
    }

    #[test]
    fn test_p010_output_rejected() {
        let config = SwitchboardConfig::default()
            .with_program(TransmitterConfig::program().with_format(PixelFormat::P010));
        assert!(config.validate_strict().is_err());
    }

    #[test]
    fn test_preview_faster_than_program_warns() {
        let config = SwitchboardConfig::default()
            .with_program_fps(25)
            .with_preview_fps(50);
        assert!(config.validate().iter().any(|w| w.contains("Preview rate")));
    }

    #[test]
    fn test_interval_from_fps() {
        let config = PipelineConfig::default();
        assert_eq!(config.preview_interval(), Duration::from_secs_f64(1.0 / 15.0));
    }
}
