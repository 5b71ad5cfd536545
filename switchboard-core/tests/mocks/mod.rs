//! Mock infrastructure for testing
//!
//! Provides frame builders, a scripted source directory and a sink whose
//! writes can be held back or made to fail.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use switchboard_core::config::TransmitterConfig;
use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::ingest::{FeedEvent, SourceDirectory, SourceFeed};
use switchboard_core::output::FrameSink;
use switchboard_core::{Frame, PixelFormat, SourceHandle};
use tokio::sync::{mpsc, Semaphore};

/// Create a solid BGRA frame; `color` is [B, G, R, A]
pub fn solid_frame(width: u32, height: u32, color: [u8; 4]) -> Frame {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..(width * height) {
        data.extend_from_slice(&color);
    }
    Frame::new(data, width, height, PixelFormat::Bgra).expect("valid test frame")
}

/// Create a BGRA frame with a diagonal gradient
pub fn gradient_frame(width: u32, height: u32) -> Frame {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = ((x as f32 / width as f32) * 255.0) as u8;
            let g = ((y as f32 / height as f32) * 255.0) as u8;
            let b = (((x + y) as f32 / (width + height) as f32) * 255.0) as u8;
            data.extend_from_slice(&[b, g, r, 255]);
        }
    }
    Frame::new(data, width, height, PixelFormat::Bgra).expect("valid test frame")
}

/// Yield to other tasks until `cond` holds
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Directory whose feeds are driven by the test
#[derive(Default)]
pub struct MockDirectory {
    sources: Mutex<Vec<SourceHandle>>,
    feeds: Mutex<HashMap<String, (u32, mpsc::Receiver<FeedEvent>)>>,
}

impl MockDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Announce `id` with a BGRA feed; the returned sender drives it
    pub fn add(&self, id: &str) -> mpsc::Sender<FeedEvent> {
        self.add_with_fourcc(id, PixelFormat::Bgra.fourcc())
    }

    /// Announce `id` with an arbitrary negotiated fourcc
    pub fn add_with_fourcc(&self, id: &str, fourcc: u32) -> mpsc::Sender<FeedEvent> {
        let (tx, rx) = mpsc::channel(8);
        let mut sources = self.sources.lock();
        if !sources.iter().any(|s| s.id == id) {
            sources.push(SourceHandle::new(id, format!("Mock {}", id)));
        }
        self.feeds.lock().insert(id.to_string(), (fourcc, rx));
        tx
    }

    pub fn handle(&self, id: &str) -> SourceHandle {
        SourceHandle::new(id, format!("Mock {}", id))
    }
}

impl SourceDirectory for MockDirectory {
    fn list_sources(&self) -> Vec<SourceHandle> {
        self.sources.lock().clone()
    }

    fn open(&self, source: &SourceHandle) -> Result<SourceFeed> {
        let (fourcc, events) = self.feeds.lock().remove(&source.id).ok_or_else(|| {
            SwitchboardError::source_unavailable(format!("{} has no pending feed", source.id))
        })?;
        Ok(SourceFeed { fourcc, events })
    }
}

#[derive(Default)]
struct SinkState {
    frames: Mutex<Vec<Arc<Frame>>>,
    writes_started: AtomicU64,
    opened: AtomicBool,
    closed: AtomicBool,
    fail_writes: AtomicBool,
}

/// Sink that records frames; optionally holds each write until released
pub struct MockSink {
    state: Arc<SinkState>,
    gate: Option<Arc<Semaphore>>,
}

/// Test-side view of a [`MockSink`]
#[derive(Clone)]
pub struct SinkProbe {
    state: Arc<SinkState>,
    gate: Option<Arc<Semaphore>>,
}

impl MockSink {
    /// Writes complete immediately
    pub fn new() -> (Self, SinkProbe) {
        Self::build(None)
    }

    /// Every write waits for one [`SinkProbe::release`]
    pub fn gated() -> (Self, SinkProbe) {
        Self::build(Some(Arc::new(Semaphore::new(0))))
    }

    fn build(gate: Option<Arc<Semaphore>>) -> (Self, SinkProbe) {
        let state = Arc::new(SinkState::default());
        (
            Self {
                state: state.clone(),
                gate: gate.clone(),
            },
            SinkProbe { state, gate },
        )
    }
}

impl FrameSink for MockSink {
    async fn open(&mut self, _config: &TransmitterConfig) -> Result<()> {
        self.state.opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write_frame(&mut self, frame: Arc<Frame>) -> Result<()> {
        self.state.writes_started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| SwitchboardError::transport_closed("gate closed"))?
                .forget();
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(SwitchboardError::transport_closed("receiver went away"));
        }
        self.state.frames.lock().push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl SinkProbe {
    /// Frames fully written so far
    pub fn frames(&self) -> Vec<Arc<Frame>> {
        self.state.frames.lock().clone()
    }

    pub fn written(&self) -> usize {
        self.state.frames.lock().len()
    }

    pub fn writes_started(&self) -> u64 {
        self.state.writes_started.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.state.opened.load(Ordering::SeqCst) && !self.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Make every following write fail as if the receiver disconnected
    pub fn fail_writes(&self) {
        self.state.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Let `n` held writes complete
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }
}
