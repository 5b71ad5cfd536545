//! Per-source ingestion task
//!
//! Each source gets its own tokio task that drains the source feed into
//! that source's [`FrameBuffer`]. Sources share nothing on the hot path,
//! so a stalled feed only ever stalls its own task.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{FeedEvent, FrameBuffer, SourceDirectory};
use crate::error::{Result, ResultExt, SwitchboardError};
use crate::events::{Notifier, SwitcherEvent};
use crate::formats::PixelFormat;
use crate::types::{Frame, Handle, SourceHandle, SourceState};

/// State shared between an ingestion task and its readers
pub struct SourceSlot {
    source: SourceHandle,
    id: Arc<str>,
    format: PixelFormat,
    buffer: FrameBuffer,
    state: AtomicU8,
    frames_received: AtomicU64,
    errors: AtomicU64,
}

impl SourceSlot {
    fn new(source: SourceHandle, format: PixelFormat) -> Self {
        Self {
            id: Arc::from(source.id.as_str()),
            source,
            format,
            buffer: FrameBuffer::new(),
            state: AtomicU8::new(SourceState::Starting.as_u8()),
            frames_received: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &SourceHandle {
        &self.source
    }

    /// Format negotiated when the feed was opened
    pub fn negotiated_format(&self) -> PixelFormat {
        self.format
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn state(&self) -> SourceState {
        SourceState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            state: self.state(),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_frame_age_ms: self.buffer.age().map(|age| age.as_millis() as u64),
        }
    }

    /// Move to `next` unless stopped or already there; returns the old state
    fn transition(&self, next: SourceState) -> Option<SourceState> {
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                let current = SourceState::from_u8(raw);
                (current != SourceState::Stopped && current != next).then_some(next.as_u8())
            })
            .ok()
            .map(SourceState::from_u8)
    }

    fn on_frame(&self, frame: Frame, notifier: &Notifier) {
        if self.state() == SourceState::Stopped {
            return;
        }
        if frame.format() != self.format {
            let reason = format!(
                "frame format {} does not match negotiated {}",
                frame.format(),
                self.format
            );
            self.degrade(&reason, notifier);
            return;
        }

        let sequence = self.frames_received.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = Arc::new(frame.with_sequence(sequence));
        self.buffer.publish(frame.clone());

        if let Some(previous) = self.transition(SourceState::Live) {
            if previous == SourceState::Degraded {
                info!("Source {} recovered", self.id);
            } else {
                debug!("Source {} is live", self.id);
            }
            notifier.event(SwitcherEvent::SourceStateChanged {
                source_id: self.source.id.clone(),
                state: SourceState::Live,
            });
        }

        if sequence % 300 == 0 {
            trace!("Source {} ingested {} frames", self.id, sequence);
        }

        notifier.frame_ready(&self.id, frame);
    }

    fn degrade(&self, reason: &str, notifier: &Notifier) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        if self.transition(SourceState::Degraded).is_some() {
            warn!("Source {} degraded: {}", self.id, reason);
            notifier.event(SwitcherEvent::SourceStateChanged {
                source_id: self.source.id.clone(),
                state: SourceState::Degraded,
            });
        } else {
            trace!("Source {} feed error while not live: {}", self.id, reason);
        }
    }

    fn mark_stopped(&self) -> bool {
        let previous = self.state.swap(SourceState::Stopped.as_u8(), Ordering::SeqCst);
        SourceState::from_u8(previous) != SourceState::Stopped
    }
}

impl std::fmt::Debug for SourceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSlot")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("state", &self.state())
            .finish()
    }
}

/// Ingestion counters for one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub state: SourceState,
    pub frames_received: u64,
    pub errors: u64,
    /// Age of the held frame, if any
    pub last_frame_age_ms: Option<u64>,
}

/// Receives frames for one source in a background task
pub struct SourceIngestor {
    handle: Handle,
    slot: Arc<SourceSlot>,
    notifier: Notifier,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SourceIngestor {
    /// Open `source` through `directory` and start receiving
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        source: SourceHandle,
        directory: &dyn SourceDirectory,
        notifier: Notifier,
    ) -> Result<Self> {
        let feed = directory
            .open(&source)
            .context(format!("Opening source {}", source.id))?;

        let format = PixelFormat::from_fourcc(feed.fourcc).ok_or_else(|| {
            SwitchboardError::FormatUnsupported(format!(
                "source {} negotiated fourcc 0x{:08x}",
                source.id, feed.fourcc
            ))
        })?;

        let handle = Handle::new();
        info!("Starting ingestion {} for {} ({})", handle, source, format);

        let slot = Arc::new(SourceSlot::new(source, format));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_feed(
            slot.clone(),
            feed.events,
            shutdown_rx,
            notifier.clone(),
        ));

        Ok(Self {
            handle,
            slot,
            notifier,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn id(&self) -> &str {
        self.slot.id()
    }

    pub fn source(&self) -> &SourceHandle {
        self.slot.source()
    }

    /// Shared slot, for registering with the switcher
    pub fn slot(&self) -> &Arc<SourceSlot> {
        &self.slot
    }

    pub fn state(&self) -> SourceState {
        self.slot.state()
    }

    pub fn stats(&self) -> IngestStats {
        self.slot.stats()
    }

    /// Stop receiving and release the feed
    ///
    /// Safe to call while a frame is being received and safe to call
    /// more than once. The buffer is empty afterwards.
    pub async fn stop(&self) {
        let first = self.slot.mark_stopped();

        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Ingestion task for {} panicked: {}", self.slot.id(), e);
            }
        }

        self.slot.buffer.clear();

        if first {
            info!("Stopped ingestion {} for {}", self.handle, self.slot.id());
            self.notifier.event(SwitcherEvent::SourceStateChanged {
                source_id: self.slot.source.id.clone(),
                state: SourceState::Stopped,
            });
        }
    }
}

impl Drop for SourceIngestor {
    fn drop(&mut self) {
        // Dropping the shutdown sender ends the task
        self.slot.mark_stopped();
        self.shutdown_tx.lock().take();
        self.slot.buffer.clear();
    }
}

async fn run_feed(
    slot: Arc<SourceSlot>,
    mut events: mpsc::Receiver<FeedEvent>,
    mut shutdown: oneshot::Receiver<()>,
    notifier: Notifier,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                debug!("Ingestion for {} cancelled", slot.id());
                break;
            }
            event = events.recv() => match event {
                Some(FeedEvent::Frame(frame)) => slot.on_frame(frame, &notifier),
                Some(FeedEvent::Error(reason)) => slot.degrade(&reason, &notifier),
                None => {
                    slot.degrade("feed disconnected", &notifier);
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SourceFeed;
    use std::time::Duration;

    struct OneShotDirectory {
        fourcc: u32,
        feed: Mutex<Option<mpsc::Receiver<FeedEvent>>>,
    }

    impl SourceDirectory for OneShotDirectory {
        fn list_sources(&self) -> Vec<SourceHandle> {
            vec![SourceHandle::new("cam", "Camera")]
        }

        fn open(&self, source: &SourceHandle) -> Result<SourceFeed> {
            let events = self
                .feed
                .lock()
                .take()
                .ok_or_else(|| SwitchboardError::source_unavailable(source.id.clone()))?;
            Ok(SourceFeed {
                fourcc: self.fourcc,
                events,
            })
        }
    }

    fn directory(fourcc: u32) -> (OneShotDirectory, mpsc::Sender<FeedEvent>) {
        let (tx, rx) = mpsc::channel(4);
        (
            OneShotDirectory {
                fourcc,
                feed: Mutex::new(Some(rx)),
            },
            tx,
        )
    }

    fn frame(value: u8) -> Frame {
        Frame::new(vec![value; 16], 2, 2, PixelFormat::Bgra).unwrap()
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_unrecognized_fourcc() {
        let (dir, _tx) = directory(0x1234_5678);
        let err = SourceIngestor::start(SourceHandle::new("cam", "Camera"), &dir, Notifier::default())
            .err()
            .unwrap();
        assert!(matches!(err, SwitchboardError::FormatUnsupported(_)));
    }

    #[tokio::test]
    async fn test_unavailable_source_keeps_kind_through_context() {
        let (dir, _tx) = directory(PixelFormat::Bgra.fourcc());
        dir.feed.lock().take();
        let err = SourceIngestor::start(SourceHandle::new("cam", "Camera"), &dir, Notifier::default())
            .err()
            .unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::SourceUnavailable);
    }

    #[tokio::test]
    async fn test_frames_publish_in_order() {
        let (dir, tx) = directory(PixelFormat::Bgra.fourcc());
        let ingestor =
            SourceIngestor::start(SourceHandle::new("cam", "Camera"), &dir, Notifier::default())
                .unwrap();
        assert_eq!(ingestor.state(), SourceState::Starting);

        for value in 1..=3 {
            tx.send(FeedEvent::Frame(frame(value))).await.unwrap();
        }
        settle().await;

        let latest = ingestor.slot().buffer().latest().unwrap();
        assert_eq!(latest.pixels()[0], 3);
        assert_eq!(latest.sequence(), 3);
        assert_eq!(ingestor.state(), SourceState::Live);
        assert_eq!(ingestor.stats().frames_received, 3);

        ingestor.stop().await;
    }

    #[tokio::test]
    async fn test_mismatched_format_rejected() {
        let (dir, tx) = directory(PixelFormat::Bgra.fourcc());
        let ingestor =
            SourceIngestor::start(SourceHandle::new("cam", "Camera"), &dir, Notifier::default())
                .unwrap();

        tx.send(FeedEvent::Frame(frame(1))).await.unwrap();
        let i420 = Frame::new(
            vec![7; PixelFormat::I420.frame_size(2, 2)],
            2,
            2,
            PixelFormat::I420,
        )
        .unwrap();
        tx.send(FeedEvent::Frame(i420)).await.unwrap();
        settle().await;

        assert_eq!(ingestor.state(), SourceState::Degraded);
        let stats = ingestor.stats();
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.errors, 1);
        let latest = ingestor.slot().buffer().latest().unwrap();
        assert_eq!(latest.format(), PixelFormat::Bgra);
        assert_eq!(latest.pixels()[0], 1);

        ingestor.stop().await;
    }

    #[tokio::test]
    async fn test_error_degrades_then_recovers() {
        let (dir, tx) = directory(PixelFormat::Bgra.fourcc());
        let notifier = Notifier::default();
        let mut events = notifier.subscribe_events();
        let ingestor =
            SourceIngestor::start(SourceHandle::new("cam", "Camera"), &dir, notifier).unwrap();

        tx.send(FeedEvent::Frame(frame(1))).await.unwrap();
        tx.send(FeedEvent::Error("decode failure".into())).await.unwrap();
        settle().await;
        assert_eq!(ingestor.state(), SourceState::Degraded);
        assert_eq!(ingestor.stats().errors, 1);

        tx.send(FeedEvent::Frame(frame(2))).await.unwrap();
        settle().await;
        assert_eq!(ingestor.state(), SourceState::Live);

        let states: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert_eq!(
            states,
            vec![
                SwitcherEvent::SourceStateChanged {
                    source_id: "cam".into(),
                    state: SourceState::Live
                },
                SwitcherEvent::SourceStateChanged {
                    source_id: "cam".into(),
                    state: SourceState::Degraded
                },
                SwitcherEvent::SourceStateChanged {
                    source_id: "cam".into(),
                    state: SourceState::Live
                },
            ]
        );

        ingestor.stop().await;
    }

    #[tokio::test]
    async fn test_disconnect_keeps_last_frame() {
        let (dir, tx) = directory(PixelFormat::Bgra.fourcc());
        let ingestor =
            SourceIngestor::start(SourceHandle::new("cam", "Camera"), &dir, Notifier::default())
                .unwrap();
        tx.send(FeedEvent::Frame(frame(9))).await.unwrap();
        drop(tx);
        settle().await;

        assert_eq!(ingestor.state(), SourceState::Degraded);
        assert_eq!(ingestor.slot().buffer().latest().unwrap().pixels()[0], 9);
        ingestor.stop().await;
    }

    #[tokio::test]
    async fn test_stop_clears_and_is_idempotent() {
        let (dir, tx) = directory(PixelFormat::Bgra.fourcc());
        let ingestor =
            SourceIngestor::start(SourceHandle::new("cam", "Camera"), &dir, Notifier::default())
                .unwrap();
        tx.send(FeedEvent::Frame(frame(5))).await.unwrap();
        settle().await;

        ingestor.stop().await;
        ingestor.stop().await;
        assert_eq!(ingestor.state(), SourceState::Stopped);
        assert!(ingestor.slot().buffer().latest().is_none());

        // Nothing is received after stop
        assert!(tx.send(FeedEvent::Frame(frame(6))).await.is_err());
        assert!(ingestor.slot().buffer().latest().is_none());
    }
}
