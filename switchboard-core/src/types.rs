//! Core types for Switchboard
//!
//! These types represent the fundamental data structures used throughout
//! the ingestion, switching and output pipeline.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

use crate::error::{Result, SwitchboardError};
use crate::formats::PixelFormat;

/// Global handle counter for unique ids
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for an ingestion or transmission session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Create a new unique handle
    pub fn new() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

/// A discoverable video source, as announced by the source directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceHandle {
    /// Stable unique identifier
    pub id: String,
    /// Human-readable name
    pub display_name: String,
}

impl SourceHandle {
    /// Create a new source handle
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

impl std::fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.display_name)
    }
}

/// Ingestion state of one source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    /// Feed opened, no frame received yet
    Starting,
    /// Frames are being published
    Live,
    /// Feed errored or disconnected; nothing is published until it recovers
    Degraded,
    /// Ingestion stopped
    Stopped,
}

impl SourceState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Live => 1,
            Self::Degraded => 2,
            Self::Stopped => 3,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Starting,
            1 => Self::Live,
            2 => Self::Degraded,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for SourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Live => write!(f, "live"),
            Self::Degraded => write!(f, "degraded"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// One of the two output paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputPath {
    /// Full-resolution selected stream
    Program,
    /// Downscaled monitoring stream
    Preview,
}

impl std::fmt::Display for OutputPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Program => write!(f, "program"),
            Self::Preview => write!(f, "preview"),
        }
    }
}

/// Decoded video frame
///
/// Immutable once built; shared between stages as `Arc<Frame>`.
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: Bytes,
    width: u32,
    height: u32,
    format: PixelFormat,
    timestamp: Instant,
    sequence: u64,
}

impl Frame {
    /// Build a frame, checking the buffer length against format and size
    pub fn new(
        pixels: impl Into<Bytes>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self> {
        let pixels = pixels.into();
        if width == 0 || height == 0 {
            return Err(SwitchboardError::invalid_frame(format!(
                "zero-sized frame {}x{}",
                width, height
            )));
        }
        let expected = format.frame_size(width, height);
        if pixels.len() != expected {
            return Err(SwitchboardError::invalid_frame(format!(
                "{} {}x{} needs {} bytes, got {}",
                format,
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            pixels,
            width,
            height,
            format,
            timestamp: Instant::now(),
            sequence: 0,
        })
    }

    /// Set the per-source sequence number
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Set the capture timestamp
    pub fn with_timestamp(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn pixels(&self) -> &Bytes {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// (width, height)
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique() {
        let a = Handle::new();
        let b = Handle::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_frame_rejects_wrong_length() {
        let err = Frame::new(vec![0u8; 10], 2, 2, PixelFormat::Bgra).unwrap_err();
        assert!(err.to_string().contains("needs 16 bytes"));
    }

    #[test]
    fn test_frame_rejects_zero_size() {
        assert!(Frame::new(Vec::new(), 0, 4, PixelFormat::Rgba).is_err());
    }

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::new(vec![7u8; 16], 2, 2, PixelFormat::Rgba)
            .unwrap()
            .with_sequence(42);
        assert_eq!(frame.size(), (2, 2));
        assert_eq!(frame.format(), PixelFormat::Rgba);
        assert_eq!(frame.sequence(), 42);
        assert_eq!(frame.pixels().len(), 16);
    }

    #[test]
    fn test_source_state_raw_roundtrip() {
        for state in [
            SourceState::Starting,
            SourceState::Live,
            SourceState::Degraded,
            SourceState::Stopped,
        ] {
            assert_eq!(SourceState::from_u8(state.as_u8()), state);
        }
    }
}
