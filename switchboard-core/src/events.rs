//! Notifications emitted by the core
//!
//! Both channels are bounded `broadcast` channels: a slow subscriber lags
//! and loses old notifications, it never stalls ingestion or output.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::{Frame, OutputPath, SourceState};

/// A source published a new frame (for per-source thumbnails)
#[derive(Debug, Clone)]
pub struct FrameReady {
    pub source_id: Arc<str>,
    pub frame: Arc<Frame>,
}

/// State changes the controlling layer may want to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitcherEvent {
    /// A source changed ingestion state
    SourceStateChanged { source_id: String, state: SourceState },
    /// The program selection changed (None = nothing selected)
    ActiveSourceChanged { source_id: Option<String> },
    /// An output's transport went away and needs a new transmitter
    TransmitterClosed { path: OutputPath, reason: String },
}

/// Sending half of both notification channels
#[derive(Debug, Clone)]
pub struct Notifier {
    frames: broadcast::Sender<FrameReady>,
    events: broadcast::Sender<SwitcherEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (frames, _) = broadcast::channel(capacity.max(1));
        let (events, _) = broadcast::channel(capacity.max(1));
        Self { frames, events }
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<FrameReady> {
        self.frames.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SwitcherEvent> {
        self.events.subscribe()
    }

    pub(crate) fn frame_ready(&self, source_id: &Arc<str>, frame: Arc<Frame>) {
        // No subscribers is fine
        let _ = self.frames.send(FrameReady {
            source_id: source_id.clone(),
            frame,
        });
    }

    pub(crate) fn event(&self, event: SwitcherEvent) {
        let _ = self.events.send(event);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(16)
    }
}
