//! In-process sinks

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::FrameSink;
use crate::config::TransmitterConfig;
use crate::error::{Result, SwitchboardError};
use crate::types::Frame;

/// Delivers frames to an in-process receiver
///
/// Writes wait for room in the channel, so a slow consumer shows up as
/// transmit backpressure upstream. Dropping the receiver closes the
/// transport.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Option<mpsc::Sender<Arc<Frame>>>,
    name: String,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<Frame>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Some(tx),
                name: String::new(),
            },
            rx,
        )
    }
}

impl FrameSink for ChannelSink {
    async fn open(&mut self, config: &TransmitterConfig) -> Result<()> {
        self.name = config.name.clone();
        match &self.tx {
            Some(tx) if !tx.is_closed() => Ok(()),
            _ => Err(SwitchboardError::transport_closed("receiver dropped")),
        }
    }

    async fn write_frame(&mut self, frame: Arc<Frame>) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| SwitchboardError::transport_closed("sink closed"))?;
        tx.send(frame)
            .await
            .map_err(|_| SwitchboardError::transport_closed("receiver dropped"))
    }

    async fn close(&mut self) -> Result<()> {
        if self.tx.take().is_some() {
            debug!("Channel sink '{}' closed", self.name);
        }
        Ok(())
    }
}

/// Accepts and discards every frame
#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
    open: bool,
}

impl NullSink {
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for NullSink {
    async fn open(&mut self, config: &TransmitterConfig) -> Result<()> {
        debug!("Null sink opened as '{}'", config.name);
        self.open = true;
        Ok(())
    }

    async fn write_frame(&mut self, _frame: Arc<Frame>) -> Result<()> {
        if !self.open {
            return Err(SwitchboardError::transport_closed("sink not open"));
        }
        self.frames += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            debug!("Null sink closed after {} frames", self.frames);
        }
        self.open = false;
        Ok(())
    }
}
