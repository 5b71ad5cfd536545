//! Switchboard Core Library
//!
//! Live video-source switching: many network sources in, one program
//! output and one preview output.
//!
//! This library provides:
//! - Per-source ingestion into lock-free single-frame buffers
//! - Atomic program source selection
//! - Format conversion and preview downscaling
//! - Rate-limited program and preview transmission
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────┐    ┌────────────────┐    ┌─────────────┐
//! │ SourceDirectory │───▶│ Ingestor × N │───▶│    Switcher    │───▶│ Output      │──▶ program
//! │ (discovery)     │    │ (FrameBuffer)│    │ (active slot)  │    │ Pipeline    │──▶ preview
//! └─────────────────┘    └──────────────┘    └────────────────┘    └─────────────┘
//!                                                   ▲
//!                              select_source ───────┘
//! ```

pub mod config;
pub mod control;
pub mod convert;
pub mod error;
pub mod events;
pub mod formats;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod stats;
pub mod switcher;
pub mod types;

pub use config::{PreviewConfig, PreviewQuality, SwitchboardConfig, TransmitterConfig};
pub use control::{Switchboard, SwitchboardStatus};
pub use error::{Result, SwitchboardError};
pub use events::{FrameReady, SwitcherEvent};
pub use formats::PixelFormat;
pub use output::{FrameSink, Transmitter};
pub use pipeline::{OutputPipeline, TickOutcome};
pub use switcher::Switcher;
pub use types::{Frame, Handle, OutputPath, SourceHandle, SourceState};
