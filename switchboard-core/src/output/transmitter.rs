//! Single-slot transmitter around a frame sink

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::FrameSink;
use crate::config::TransmitterConfig;
use crate::error::{Result, SwitchboardError};
use crate::formats::PixelFormat;
use crate::types::{Frame, Handle};

/// How long `stop` lets a pending write finish before aborting it
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Upper bound on closing the sink
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type Slot = (Arc<Frame>, OwnedSemaphorePermit);

struct Shared {
    /// One permit: held from `send` until the frame is fully written
    in_flight: Arc<Semaphore>,
    close_reason: Mutex<Option<String>>,
    frames_written: AtomicU64,
}

impl Shared {
    fn close(&self, reason: impl Into<String>) {
        self.close_reason.lock().get_or_insert_with(|| reason.into());
        self.in_flight.close();
    }

    fn closed_error(&self, name: &str) -> SwitchboardError {
        let reason = self
            .close_reason
            .lock()
            .clone()
            .unwrap_or_else(|| "session closed".to_string());
        SwitchboardError::transport_closed(format!("{}: {}", name, reason))
    }
}

/// Transmission counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitterStats {
    pub frames_written: u64,
    pub closed: bool,
}

/// Owns one outbound session
///
/// `send` hands a frame to a writer task and returns immediately. At most
/// one frame is in flight: a `send` before the previous frame finished
/// writing fails with `TransmitBackpressure` and the caller drops that
/// frame. A frame that has been handed over is written whole unless the
/// write is still stalled when the transmitter is stopped or dropped.
pub struct Transmitter {
    handle: Handle,
    config: TransmitterConfig,
    shared: Arc<Shared>,
    slot_tx: Mutex<Option<mpsc::Sender<Slot>>>,
    cancel: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Transmitter {
    /// Open the session on `sink` and start the writer task
    pub async fn start<S: FrameSink>(config: TransmitterConfig, mut sink: S) -> Result<Self> {
        let handle = Handle::new();

        if let Err(e) = sink.open(&config).await {
            // Release whatever the sink managed to acquire
            if let Err(close_err) = sink.close().await {
                debug!("Closing sink after failed open: {}", close_err);
            }
            return Err(SwitchboardError::transport_closed(format!(
                "failed to open '{}': {}",
                config.name, e
            )));
        }

        info!(
            "Transmitter {} announced as '{}' in {:?} ({})",
            handle, config.name, config.groups, config.format
        );

        let shared = Arc::new(Shared {
            in_flight: Arc::new(Semaphore::new(1)),
            close_reason: Mutex::new(None),
            frames_written: AtomicU64::new(0),
        });

        let (slot_tx, slot_rx) = mpsc::channel(1);
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(write_loop(
            sink,
            slot_rx,
            cancel_rx,
            shared.clone(),
            config.name.clone(),
        ));

        Ok(Self {
            handle,
            config,
            shared,
            slot_tx: Mutex::new(Some(slot_tx)),
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Pixel format this transport expects
    pub fn format(&self) -> PixelFormat {
        self.config.format
    }

    pub fn config(&self) -> &TransmitterConfig {
        &self.config
    }

    /// Queue `frame` for transmission
    ///
    /// Fails with `TransportClosed` once stopped or after a write failure,
    /// and with `TransmitBackpressure` while the previous frame is still
    /// being written.
    pub fn send(&self, frame: Arc<Frame>) -> Result<()> {
        let permit = match self.shared.in_flight.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => return Err(SwitchboardError::TransmitBackpressure),
            Err(TryAcquireError::Closed) => return Err(self.shared.closed_error(&self.config.name)),
        };

        let slot_tx = self.slot_tx.lock();
        let Some(tx) = slot_tx.as_ref() else {
            return Err(self.shared.closed_error(&self.config.name));
        };
        match tx.try_send((frame, permit)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SwitchboardError::TransmitBackpressure),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(self.shared.closed_error(&self.config.name))
            }
        }
    }

    /// Whether the session has been torn down
    pub fn is_closed(&self) -> bool {
        self.shared.in_flight.is_closed()
    }

    /// Why the session closed, once it has
    pub fn close_reason(&self) -> Option<String> {
        self.shared.close_reason.lock().clone()
    }

    /// Whether a frame is currently being written
    pub fn is_busy(&self) -> bool {
        !self.is_closed() && self.shared.in_flight.available_permits() == 0
    }

    pub fn stats(&self) -> TransmitterStats {
        TransmitterStats {
            frames_written: self.shared.frames_written.load(Ordering::Relaxed),
            closed: self.is_closed(),
        }
    }

    /// Tear the session down
    ///
    /// A frame already handed over gets a short grace period to finish
    /// writing, after which the write is aborted. The sink is closed on
    /// every path. Safe to call concurrently with `send` and more than once.
    pub async fn stop(&self) {
        self.shared.close("transmitter stopped");
        self.slot_tx.lock().take();

        let task = self.task.lock().take();
        let Some(mut task) = task else {
            return;
        };

        let joined = match tokio::time::timeout(STOP_GRACE, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    "Transmitter '{}' write still pending after {:?}, aborting",
                    self.config.name, STOP_GRACE
                );
                self.cancel.send_replace(true);
                task.await
            }
        };
        if let Err(e) = joined {
            warn!("Writer task for '{}' panicked: {}", self.config.name, e);
        }
        info!("Transmitter {} ('{}') stopped", self.handle, self.config.name);
    }
}

impl Drop for Transmitter {
    fn drop(&mut self) {
        // The writer aborts any pending write, then closes the sink on its own
        self.shared.close("transmitter dropped");
        self.slot_tx.lock().take();
        self.cancel.send_replace(true);
    }
}

impl std::fmt::Debug for Transmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmitter")
            .field("handle", &self.handle)
            .field("name", &self.config.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn write_loop<S: FrameSink>(
    mut sink: S,
    mut slot_rx: mpsc::Receiver<Slot>,
    mut cancel: watch::Receiver<bool>,
    shared: Arc<Shared>,
    name: String,
) {
    while let Some((frame, permit)) = slot_rx.recv().await {
        let written = tokio::select! {
            written = sink.write_frame(frame) => written,
            _ = cancel.wait_for(|cancelled| *cancelled) => {
                warn!("Transmitter '{}' write aborted", name);
                shared.close("write aborted");
                break;
            }
        };
        match written {
            Ok(()) => {
                shared.frames_written.fetch_add(1, Ordering::Relaxed);
                drop(permit);
            }
            Err(e) => {
                error!("Transmitter '{}' write failed: {}", name, e);
                shared.close(e.to_string());
                break;
            }
        }
    }

    shared.in_flight.close();
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Closing sink for '{}' failed: {}", name, e),
        Err(_) => warn!("Closing sink for '{}' timed out", name),
    }
    debug!("Writer for '{}' finished", name);
}
