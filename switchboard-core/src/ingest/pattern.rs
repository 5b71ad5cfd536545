//! Synthetic test-pattern sources
//!
//! Each source paints a solid background with a vertical bar sweeping
//! across it, which makes switching visible on the receiving end. Used
//! by the CLI for dry runs and for exercising the pipeline without any
//! network sources.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::{FeedEvent, SourceDirectory, SourceFeed};
use crate::error::{Result, SwitchboardError};
use crate::formats::PixelFormat;
use crate::types::{Frame, SourceHandle};

/// Feed buffer depth; frames beyond this are dropped at the source
const FEED_CAPACITY: usize = 2;

/// One synthetic source
#[derive(Debug, Clone)]
pub struct PatternSource {
    pub handle: SourceHandle,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Background color as [R, G, B]
    pub color: [u8; 3],
}

impl PatternSource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, color: [u8; 3]) -> Self {
        Self {
            handle: SourceHandle::new(id, name),
            width: 640,
            height: 360,
            fps: 30,
            color,
        }
    }

    /// Set the frame size
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the frame rate
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Paint frame number `n` as BGRA
    pub fn render(&self, n: u64) -> Result<Frame> {
        let [r, g, b] = self.color;
        let bar_width = (self.width / 16).max(1);
        let bar_x = ((n * 4) % self.width as u64) as u32;

        let mut pixels = Vec::with_capacity(PixelFormat::Bgra.frame_size(self.width, self.height));
        for _ in 0..self.height {
            for x in 0..self.width {
                if x >= bar_x && x < bar_x + bar_width {
                    pixels.extend_from_slice(&[255, 255, 255, 255]);
                } else {
                    pixels.extend_from_slice(&[b, g, r, 255]);
                }
            }
        }
        Frame::new(pixels, self.width, self.height, PixelFormat::Bgra)
    }
}

/// Directory of synthetic sources
#[derive(Debug, Clone, Default)]
pub struct PatternDirectory {
    sources: Vec<PatternSource>,
}

impl PatternDirectory {
    pub fn new(sources: Vec<PatternSource>) -> Self {
        Self { sources }
    }

    /// Three sources: red, green and blue
    pub fn with_defaults() -> Self {
        Self::new(vec![
            PatternSource::new("cam1", "Camera 1 (red)", [200, 40, 40]),
            PatternSource::new("cam2", "Camera 2 (green)", [40, 200, 40]),
            PatternSource::new("cam3", "Camera 3 (blue)", [40, 40, 200]),
        ])
    }
}

impl SourceDirectory for PatternDirectory {
    fn list_sources(&self) -> Vec<SourceHandle> {
        self.sources.iter().map(|s| s.handle.clone()).collect()
    }

    fn open(&self, source: &SourceHandle) -> Result<SourceFeed> {
        let pattern = self
            .sources
            .iter()
            .find(|s| s.handle.id == source.id)
            .cloned()
            .ok_or_else(|| {
                SwitchboardError::source_unavailable(format!("no pattern source '{}'", source.id))
            })?;

        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        tokio::spawn(generate(pattern, tx));

        Ok(SourceFeed {
            fourcc: PixelFormat::Bgra.fourcc(),
            events: rx,
        })
    }
}

async fn generate(pattern: PatternSource, tx: mpsc::Sender<FeedEvent>) {
    let period = Duration::from_secs_f64(1.0 / pattern.fps.max(1) as f64);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    for n in 0u64.. {
        ticker.tick().await;
        let event = match pattern.render(n) {
            Ok(frame) => FeedEvent::Frame(frame),
            Err(e) => FeedEvent::Error(e.to_string()),
        };
        match tx.try_send(event) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }
    debug!("Pattern source {} finished", pattern.handle.id);
}
