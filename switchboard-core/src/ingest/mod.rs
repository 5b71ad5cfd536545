//! Source discovery and per-source frame ingestion
//!
//! This module handles:
//! - The source directory seam (listing and opening sources)
//! - One ingestion task per source, publishing into a latest-wins buffer
//! - A synthetic test-pattern directory

mod buffer;
mod ingestor;
pub mod pattern;

pub use buffer::FrameBuffer;
pub use ingestor::{IngestStats, SourceIngestor, SourceSlot};
pub use pattern::{PatternDirectory, PatternSource};

use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{Frame, SourceHandle};

/// Something a source feed delivers
#[derive(Debug)]
pub enum FeedEvent {
    /// A decoded frame
    Frame(Frame),
    /// The transport hit an error (decode failure, dropout); the feed may
    /// recover and deliver frames again
    Error(String),
}

/// An opened source: the negotiated format plus a bounded event stream
///
/// The feed ends (channel closed) when the source disconnects.
#[derive(Debug)]
pub struct SourceFeed {
    /// Negotiated pixel format fourcc
    pub fourcc: u32,
    /// Frames and errors in arrival order
    pub events: mpsc::Receiver<FeedEvent>,
}

/// Where sources come from
///
/// Discovery protocol details live behind this trait.
pub trait SourceDirectory: Send + Sync {
    /// Currently discoverable sources
    fn list_sources(&self) -> Vec<SourceHandle>;

    /// Open a feed for `source`
    ///
    /// Called from within a tokio runtime.
    fn open(&self, source: &SourceHandle) -> Result<SourceFeed>;
}
