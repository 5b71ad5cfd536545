//! Outbound transmission
//!
//! A [`Transmitter`] wraps one outbound session (program or preview). The
//! transport itself sits behind the [`FrameSink`] trait:
//! - [`TcpSink`] streams frames to a network receiver
//! - [`ChannelSink`] hands frames to an in-process consumer
//! - [`NullSink`] discards frames (dry runs)

mod channel;
mod tcp;
mod transmitter;

pub use channel::{ChannelSink, NullSink};
pub use tcp::{TcpSink, WIRE_MAGIC, WIRE_VERSION};
pub use transmitter::{Transmitter, TransmitterStats};

use std::future::Future;
use std::sync::Arc;

use crate::config::TransmitterConfig;
use crate::error::Result;
use crate::types::Frame;

/// One outbound video transport session
///
/// The transmitter drives a sink from a single writer task, so calls are
/// never concurrent.
pub trait FrameSink: Send + 'static {
    /// Establish the session and announce it under the configured name
    fn open(&mut self, config: &TransmitterConfig) -> impl Future<Output = Result<()>> + Send;

    /// Write one already-converted frame
    fn write_frame(&mut self, frame: Arc<Frame>) -> impl Future<Output = Result<()>> + Send;

    /// Tear the session down
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
