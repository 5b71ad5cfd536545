//! Program and preview output paths
//!
//! Each path runs its own periodic task:
//!
//! ```text
//! tick -> Switcher::current_frame -> convert (blocking pool) -> Transmitter::send
//! ```
//!
//! A tick with nothing new to send is skipped. A frame that could not be
//! sent (backpressure, failure) is never retried: the next tick picks up
//! whatever is current by then. The two paths share nothing but the
//! switcher, so a stall or failure on one never affects the other.

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::config::{PipelineConfig, PreviewConfig, PreviewQuality};
use crate::convert;
use crate::error::SwitchboardError;
use crate::events::{Notifier, SwitcherEvent};
use crate::output::Transmitter;
use crate::stats::{PathStats, PathStatsSnapshot};
use crate::switcher::Switcher;
use crate::types::{Frame, Handle, OutputPath};

/// Result of one output cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was handed to the transmitter
    Sent,
    /// Nothing selected, no frame yet, or the frame went stale
    NoFrame,
    /// Current frame was already attempted on this path
    Unchanged,
    /// Transmitter still busy with the previous frame; frame dropped
    Dropped,
    /// Conversion or transmission failed; frame dropped
    Failed,
    /// The path has no open transmitter
    Closed,
}

impl std::fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Sent => "sent",
            Self::NoFrame => "no frame",
            Self::Unchanged => "unchanged",
            Self::Dropped => "dropped",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

struct OutputLane {
    path: OutputPath,
    transmitter: ArcSwapOption<Transmitter>,
    /// Last frame this path tried to send
    last_attempted: Mutex<Option<Arc<Frame>>>,
    closed_reported: AtomicBool,
    /// Serializes timer ticks with manual ticks
    tick_lock: tokio::sync::Mutex<()>,
    stats: PathStats,
}

impl OutputLane {
    fn new(path: OutputPath, transmitter: Transmitter) -> Self {
        Self {
            path,
            transmitter: ArcSwapOption::from_pointee(transmitter),
            last_attempted: Mutex::new(None),
            closed_reported: AtomicBool::new(false),
            tick_lock: tokio::sync::Mutex::new(()),
            stats: PathStats::new(),
        }
    }
}

struct Shared {
    switcher: Arc<Switcher>,
    preview: ArcSwap<PreviewConfig>,
    program: OutputLane,
    preview_lane: OutputLane,
    notifier: Notifier,
}

impl Shared {
    fn lane(&self, path: OutputPath) -> &OutputLane {
        match path {
            OutputPath::Program => &self.program,
            OutputPath::Preview => &self.preview_lane,
        }
    }

    async fn tick(&self, path: OutputPath) -> TickOutcome {
        let lane = self.lane(path);
        let _tick = lane.tick_lock.lock().await;

        let Some(transmitter) = lane.transmitter.load_full() else {
            return TickOutcome::Closed;
        };
        if transmitter.is_closed() {
            let reason = transmitter
                .close_reason()
                .unwrap_or_else(|| "transport closed".to_string());
            self.report_closed(lane, reason);
            return TickOutcome::Closed;
        }

        let Some(frame) = self.switcher.current_frame() else {
            lane.stats.record_skipped();
            return TickOutcome::NoFrame;
        };

        {
            let mut last = lane.last_attempted.lock();
            if last.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, &frame)) {
                lane.stats.record_skipped();
                return TickOutcome::Unchanged;
            }
            *last = Some(frame.clone());
        }

        // Preview dimensions are read once per tick
        let target_size = match path {
            OutputPath::Program => frame.size(),
            OutputPath::Preview => {
                let preview = self.preview.load();
                (preview.width, preview.height)
            }
        };
        let target_format = transmitter.format();

        let outgoing = if frame.format() == target_format && frame.size() == target_size {
            frame
        } else {
            let started = Instant::now();
            let converted = tokio::task::spawn_blocking(move || {
                convert::convert(&frame, target_format, target_size)
            })
            .await;
            lane.stats.record_conversion(started.elapsed());

            match converted {
                Ok(Ok(converted)) => Arc::new(converted),
                Ok(Err(e)) => {
                    warn!("{} conversion failed: {}", path, e);
                    lane.stats.record_failed();
                    return TickOutcome::Failed;
                }
                Err(e) => {
                    error!("{} conversion task failed: {}", path, e);
                    lane.stats.record_failed();
                    return TickOutcome::Failed;
                }
            }
        };

        match transmitter.send(outgoing) {
            Ok(()) => {
                lane.stats.record_sent();
                TickOutcome::Sent
            }
            Err(SwitchboardError::TransmitBackpressure) => {
                debug!("{} transmitter busy, dropping frame", path);
                lane.stats.record_dropped();
                TickOutcome::Dropped
            }
            Err(e @ SwitchboardError::TransportClosed(_)) => {
                self.report_closed(lane, e.to_string());
                TickOutcome::Closed
            }
            Err(e) => {
                warn!("{} send failed: {}", path, e);
                lane.stats.record_failed();
                TickOutcome::Failed
            }
        }
    }

    fn report_closed(&self, lane: &OutputLane, reason: String) {
        if lane.closed_reported.swap(true, Ordering::AcqRel) {
            return;
        }
        error!("{} transmitter closed: {}", lane.path, reason);
        self.notifier.event(SwitcherEvent::TransmitterClosed {
            path: lane.path,
            reason,
        });
    }
}

/// Drives the program and preview outputs
pub struct OutputPipeline {
    handle: Handle,
    config: PipelineConfig,
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl OutputPipeline {
    /// Build the pipeline without starting its timers
    ///
    /// Outputs only advance through [`Self::tick`].
    pub fn new(
        switcher: Arc<Switcher>,
        config: &PipelineConfig,
        program: Transmitter,
        preview: Transmitter,
        notifier: Notifier,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            handle: Handle::new(),
            config: config.clone(),
            shared: Arc::new(Shared {
                switcher,
                preview: ArcSwap::from_pointee(PreviewConfig::from_quality(config.preview_quality)),
                program: OutputLane::new(OutputPath::Program, program),
                preview_lane: OutputLane::new(OutputPath::Preview, preview),
                notifier,
            }),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Build the pipeline and start both output tasks
    pub fn start(
        switcher: Arc<Switcher>,
        config: &PipelineConfig,
        program: Transmitter,
        preview: Transmitter,
        notifier: Notifier,
    ) -> Self {
        let pipeline = Self::new(switcher, config, program, preview, notifier);
        let program_task = pipeline.spawn_path(OutputPath::Program, config.program_interval());
        let preview_task = pipeline.spawn_path(OutputPath::Preview, config.preview_interval());
        pipeline.tasks.lock().extend([program_task, preview_task]);

        info!(
            "Output pipeline {} started: program @ {}fps, preview @ {}fps ({})",
            pipeline.handle,
            config.program_fps,
            config.preview_fps,
            pipeline.preview_config()
        );
        pipeline
    }

    fn spawn_path(&self, path: OutputPath, period: Duration) -> JoinHandle<()> {
        tokio::spawn(run_path(
            self.shared.clone(),
            path,
            period,
            self.shutdown.subscribe(),
        ))
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one output cycle on `path` now
    pub async fn tick(&self, path: OutputPath) -> TickOutcome {
        self.shared.tick(path).await
    }

    /// Current preview dimensions
    pub fn preview_config(&self) -> PreviewConfig {
        **self.shared.preview.load()
    }

    /// Change the preview resolution; applies from the next preview tick
    pub fn set_preview_quality(&self, quality: PreviewQuality) -> PreviewConfig {
        let preview = PreviewConfig::from_quality(quality);
        self.shared.preview.store(Arc::new(preview));
        // Let the next tick resend the current frame at the new size
        self.shared.preview_lane.last_attempted.lock().take();
        info!("Preview quality set to {} ({})", quality, preview);
        preview
    }

    /// Transmitter currently installed on `path`
    pub fn transmitter(&self, path: OutputPath) -> Option<Arc<Transmitter>> {
        self.shared.lane(path).transmitter.load_full()
    }

    /// Install a new session on `path`, stopping the old one
    pub async fn replace_transmitter(&self, path: OutputPath, transmitter: Transmitter) {
        let lane = self.shared.lane(path);
        info!("Replacing {} transmitter with '{}'", path, transmitter.name());
        let old = lane.transmitter.swap(Some(Arc::new(transmitter)));
        lane.last_attempted.lock().take();
        lane.closed_reported.store(false, Ordering::Release);

        if let Some(old) = old {
            old.stop().await;
        }
    }

    pub fn stats(&self) -> PipelineStats {
        let program = self.transmitter(OutputPath::Program);
        let preview = self.transmitter(OutputPath::Preview);
        PipelineStats {
            handle: self.handle,
            program: self.shared.program.stats.snapshot(),
            preview: self.shared.preview_lane.stats.snapshot(),
            program_open: program.is_some_and(|tx| !tx.is_closed()),
            preview_open: preview.is_some_and(|tx| !tx.is_closed()),
            preview_config: self.preview_config(),
        }
    }

    /// Stop both output tasks, then both transmitters
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Output task panicked: {}", e);
            }
        }

        for lane in [&self.shared.program, &self.shared.preview_lane] {
            if let Some(transmitter) = lane.transmitter.swap(None) {
                transmitter.stop().await;
            }
        }
        debug!("Output pipeline {} stopped", self.handle);
    }
}

impl Drop for OutputPipeline {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

impl std::fmt::Debug for OutputPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputPipeline")
            .field("handle", &self.handle)
            .field("preview", &self.preview_config())
            .field("config", &self.config)
            .finish()
    }
}

async fn run_path(
    shared: Arc<Shared>,
    path: OutputPath,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let outcome = shared.tick(path).await;
                trace!("{} tick: {}", path, outcome);
            }
        }
    }
    debug!("{} output task finished", path);
}

/// Output pipeline statistics
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Pipeline handle
    pub handle: Handle,
    pub program: PathStatsSnapshot,
    pub preview: PathStatsSnapshot,
    /// Whether the program transport is open
    pub program_open: bool,
    /// Whether the preview transport is open
    pub preview_open: bool,
    pub preview_config: PreviewConfig,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = |open: bool| if open { "open" } else { "closed" };
        write!(
            f,
            "Pipeline {}: program [{}] {}, preview {} [{}] {}",
            self.handle,
            state(self.program_open),
            self.program,
            self.preview_config,
            state(self.preview_open),
            self.preview
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransmitterConfig;
    use crate::output::NullSink;

    async fn pipeline() -> OutputPipeline {
        let program = Transmitter::start(TransmitterConfig::program(), NullSink::default())
            .await
            .unwrap();
        let preview = Transmitter::start(TransmitterConfig::preview(), NullSink::default())
            .await
            .unwrap();
        OutputPipeline::new(
            Arc::new(Switcher::new(Duration::from_secs(2))),
            &PipelineConfig::default(),
            program,
            preview,
            Notifier::default(),
        )
    }

    #[tokio::test]
    async fn test_no_selection_skips() {
        let pipeline = pipeline().await;
        assert_eq!(pipeline.tick(OutputPath::Program).await, TickOutcome::NoFrame);
        assert_eq!(pipeline.tick(OutputPath::Preview).await, TickOutcome::NoFrame);
        assert_eq!(pipeline.stats().program.skipped, 1);
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_preview_quality() {
        let pipeline = pipeline().await;
        assert_eq!(pipeline.preview_config().width, 640);

        let preview = pipeline.set_preview_quality(PreviewQuality::Low);
        assert_eq!((preview.width, preview.height), (320, 240));
        assert_eq!(pipeline.preview_config(), preview);
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_paths() {
        let pipeline = pipeline().await;
        pipeline.stop().await;
        assert_eq!(pipeline.tick(OutputPath::Program).await, TickOutcome::Closed);
        let stats = pipeline.stats();
        assert!(!stats.program_open);
        assert!(!stats.preview_open);
        // Second stop is a no-op
        pipeline.stop().await;
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(TickOutcome::NoFrame.to_string(), "no frame");
        assert_eq!(TickOutcome::Dropped.to_string(), "dropped");
    }
}
