//! Control surface
//!
//! [`Switchboard`] ties the pieces together: it starts and stops source
//! ingestion, forwards selection and preview changes, and reports status.
//! Control errors come back synchronously and leave state untouched.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::{PreviewConfig, PreviewQuality, SwitchboardConfig};
use crate::error::{Result, SwitchboardError};
use crate::events::{FrameReady, Notifier, SwitcherEvent};
use crate::formats::PixelFormat;
use crate::ingest::{IngestStats, SourceDirectory, SourceIngestor};
use crate::output::Transmitter;
use crate::pipeline::{OutputPipeline, PipelineStats, TickOutcome};
use crate::switcher::Switcher;
use crate::types::{Handle, OutputPath, SourceHandle, SourceState};

/// Live video switcher
pub struct Switchboard {
    handle: Handle,
    config: SwitchboardConfig,
    directory: Arc<dyn SourceDirectory>,
    switcher: Arc<Switcher>,
    ingestors: Mutex<HashMap<String, Arc<SourceIngestor>>>,
    pipeline: OutputPipeline,
    notifier: Notifier,
}

impl Switchboard {
    /// Start switching onto already-open transmitters
    pub fn start(
        directory: Arc<dyn SourceDirectory>,
        config: SwitchboardConfig,
        program: Transmitter,
        preview: Transmitter,
    ) -> Result<Self> {
        log_warnings(&config)?;
        Ok(Self::build(directory, config, program, preview, true))
    }

    /// Like [`Self::start`], but outputs only advance through [`Self::tick`]
    pub fn manual(
        directory: Arc<dyn SourceDirectory>,
        config: SwitchboardConfig,
        program: Transmitter,
        preview: Transmitter,
    ) -> Result<Self> {
        log_warnings(&config)?;
        Ok(Self::build(directory, config, program, preview, false))
    }

    fn build(
        directory: Arc<dyn SourceDirectory>,
        config: SwitchboardConfig,
        program: Transmitter,
        preview: Transmitter,
        timers: bool,
    ) -> Self {
        let notifier = Notifier::new(config.notify_capacity);
        let switcher = Arc::new(Switcher::new(config.staleness));
        let pipeline = if timers {
            OutputPipeline::start(
                switcher.clone(),
                &config.pipeline,
                program,
                preview,
                notifier.clone(),
            )
        } else {
            OutputPipeline::new(
                switcher.clone(),
                &config.pipeline,
                program,
                preview,
                notifier.clone(),
            )
        };

        let handle = Handle::new();
        info!("Switchboard {} ready", handle);

        Self {
            handle,
            config,
            directory,
            switcher,
            ingestors: Mutex::new(HashMap::new()),
            pipeline,
            notifier,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn config(&self) -> &SwitchboardConfig {
        &self.config
    }

    pub fn switcher(&self) -> &Arc<Switcher> {
        &self.switcher
    }

    pub fn pipeline(&self) -> &OutputPipeline {
        &self.pipeline
    }

    /// Sources the directory currently offers
    pub fn list_sources(&self) -> Vec<SourceHandle> {
        self.directory.list_sources()
    }

    /// Start receiving `source` and make it selectable
    ///
    /// A source that is already ingesting is left alone.
    pub fn start_ingestion(&self, source: &SourceHandle) -> Result<()> {
        let mut ingestors = self.ingestors.lock();
        if let Some(existing) = ingestors.get(&source.id) {
            if existing.state() != SourceState::Stopped {
                debug!("Source {} already ingesting", source.id);
                return Ok(());
            }
        }

        let ingestor = Arc::new(SourceIngestor::start(
            source.clone(),
            self.directory.as_ref(),
            self.notifier.clone(),
        )?);
        self.switcher.register(ingestor.slot().clone());
        ingestors.insert(source.id.clone(), ingestor);
        Ok(())
    }

    /// Start every source the directory lists; returns how many started
    pub fn start_all(&self) -> usize {
        self.list_sources()
            .iter()
            .filter(|source| match self.start_ingestion(source) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Could not start {}: {}", source, e);
                    false
                }
            })
            .count()
    }

    /// Stop receiving `id` and remove it from the selectable set
    pub async fn stop_ingestion(&self, id: &str) -> Result<()> {
        let ingestor = self
            .ingestors
            .lock()
            .remove(id)
            .ok_or_else(|| SwitchboardError::unknown_source(id))?;

        if self.switcher.unregister(ingestor.slot()) {
            self.notifier
                .event(SwitcherEvent::ActiveSourceChanged { source_id: None });
        }
        ingestor.stop().await;
        Ok(())
    }

    /// Stop and reopen `id`; an active selection follows the new feed
    pub async fn restart_ingestion(&self, id: &str) -> Result<()> {
        let old = self
            .ingestors
            .lock()
            .remove(id)
            .ok_or_else(|| SwitchboardError::unknown_source(id))?;
        let source = old.source().clone();
        old.stop().await;

        info!("Restarting ingestion for {}", source);
        if let Err(e) = self.start_ingestion(&source) {
            if self.switcher.unregister(old.slot()) {
                self.notifier
                    .event(SwitcherEvent::ActiveSourceChanged { source_id: None });
            }
            return Err(e.with_context(format!("Restarting {}", id)));
        }
        Ok(())
    }

    /// Make `id` the program source from the next output cycle on
    pub fn select_source(&self, id: &str) -> Result<()> {
        let previous = self.switcher.active_source();
        self.switcher.select_source(id)?;
        if previous.as_deref() != Some(id) {
            self.notifier.event(SwitcherEvent::ActiveSourceChanged {
                source_id: Some(id.to_string()),
            });
        }
        Ok(())
    }

    pub fn active_source(&self) -> Option<String> {
        self.switcher.active_source()
    }

    /// Change the preview resolution by level name (`low`, `medium`, `high`)
    pub fn set_preview_quality(&self, level: &str) -> Result<PreviewConfig> {
        let quality: PreviewQuality = level.parse()?;
        Ok(self.pipeline.set_preview_quality(quality))
    }

    pub fn preview_config(&self) -> PreviewConfig {
        self.pipeline.preview_config()
    }

    /// Run one output cycle on `path` now
    pub async fn tick(&self, path: OutputPath) -> TickOutcome {
        self.pipeline.tick(path).await
    }

    /// Install a new session after a `TransmitterClosed` event
    pub async fn replace_transmitter(&self, path: OutputPath, transmitter: Transmitter) {
        self.pipeline.replace_transmitter(path, transmitter).await;
    }

    /// Per-source frame notifications
    pub fn subscribe_frames(&self) -> broadcast::Receiver<FrameReady> {
        self.notifier.subscribe_frames()
    }

    /// State change notifications
    pub fn subscribe_events(&self) -> broadcast::Receiver<SwitcherEvent> {
        self.notifier.subscribe_events()
    }

    pub fn status(&self) -> SwitchboardStatus {
        let mut sources: Vec<SourceStatus> = self
            .ingestors
            .lock()
            .values()
            .map(|ingestor| SourceStatus {
                id: ingestor.id().to_string(),
                name: ingestor.source().display_name.clone(),
                format: ingestor.slot().negotiated_format(),
                stats: ingestor.stats(),
            })
            .collect();
        sources.sort_by(|a, b| a.id.cmp(&b.id));

        SwitchboardStatus {
            handle: self.handle,
            active_source: self.switcher.active_source(),
            sources,
            pipeline: self.pipeline.stats(),
        }
    }

    /// Stop the outputs and every ingestor
    ///
    /// Sources are stopped alongside the outputs, so a stalled transport
    /// does not keep them running.
    pub async fn shutdown(&self) {
        info!("Shutting down switchboard {}", self.handle);
        self.switcher.clear_selection();
        let ingestors: Vec<_> = self.ingestors.lock().drain().map(|(_, i)| i).collect();

        let stop_sources = async {
            for ingestor in ingestors {
                self.switcher.unregister(ingestor.slot());
                ingestor.stop().await;
            }
        };
        tokio::join!(self.pipeline.stop(), stop_sources);
        debug!("Switchboard {} shut down", self.handle);
    }
}

impl std::fmt::Debug for Switchboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switchboard")
            .field("handle", &self.handle)
            .field("switcher", &self.switcher)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

fn log_warnings(config: &SwitchboardConfig) -> Result<()> {
    for warning in config.validate_strict()? {
        warn!("Config: {}", warning);
    }
    Ok(())
}

/// One ingesting source
#[derive(Debug, Clone)]
pub struct SourceStatus {
    pub id: String,
    pub name: String,
    pub format: PixelFormat,
    pub stats: IngestStats,
}

/// Snapshot of the whole switcher
#[derive(Debug, Clone)]
pub struct SwitchboardStatus {
    pub handle: Handle,
    pub active_source: Option<String>,
    pub sources: Vec<SourceStatus>,
    pub pipeline: PipelineStats,
}

impl std::fmt::Display for SwitchboardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Switchboard {}: on air = {}",
            self.handle,
            self.active_source.as_deref().unwrap_or("(none)")
        )?;
        for source in &self.sources {
            let age = source
                .stats
                .last_frame_age_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                f,
                "  {:<12} {:<9} {:<5} frames={} errors={} age={}",
                source.id,
                source.stats.state,
                source.format,
                source.stats.frames_received,
                source.stats.errors,
                age
            )?;
        }
        write!(f, "  {}", self.pipeline)
    }
}
