//! Raw frame streaming over TCP
//!
//! Wire format, all integers big-endian:
//!
//! ```text
//! hello: "SWBD" | version u8 | kind=1 u8 | name_len u16 | name
//!        | group_count u8 | (len u16 | group)*
//! frame: "SWBD" | version u8 | kind=2 u8 | fourcc u32 | width u32
//!        | height u32 | sequence u64 | pts_us u64 | len u32 | pixels
//! ```
//!
//! `pts_us` counts from the moment the session was opened.

use bytes::{BufMut, BytesMut};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info};

use super::FrameSink;
use crate::config::TransmitterConfig;
use crate::error::{Result, ResultExt, SwitchboardError};
use crate::types::Frame;

pub const WIRE_MAGIC: &[u8; 4] = b"SWBD";
pub const WIRE_VERSION: u8 = 1;

const KIND_HELLO: u8 = 1;
const KIND_FRAME: u8 = 2;
const FRAME_HEADER_LEN: usize = 38;

/// Streams frames to a TCP receiver
#[derive(Debug)]
pub struct TcpSink {
    addr: String,
    stream: Option<TcpStream>,
    opened_at: Option<Instant>,
}

impl TcpSink {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream: None,
            opened_at: None,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl FrameSink for TcpSink {
    async fn open(&mut self, config: &TransmitterConfig) -> Result<()> {
        let hello = encode_hello(config)?;
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(SwitchboardError::from)
            .context(format!("connecting to {}", self.addr))?;
        stream.set_nodelay(true)?;
        stream
            .write_all(&hello)
            .await
            .map_err(|e| SwitchboardError::transport_closed(format!("{}: {}", self.addr, e)))?;

        info!("Streaming '{}' to {}", config.name, self.addr);
        self.stream = Some(stream);
        self.opened_at = Some(Instant::now());
        Ok(())
    }

    async fn write_frame(&mut self, frame: Arc<Frame>) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SwitchboardError::transport_closed("not connected"))?;
        let origin = self.opened_at.unwrap_or_else(Instant::now);

        let header = encode_frame_header(&frame, origin)?;
        let result = async {
            stream.write_all(&header).await?;
            stream.write_all(frame.pixels()).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;

        result.map_err(|e| SwitchboardError::transport_closed(format!("{}: {}", self.addr, e)))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Closing stream to {}", self.addr);
            stream.shutdown().await?;
        }
        Ok(())
    }
}

pub(crate) fn encode_hello(config: &TransmitterConfig) -> Result<BytesMut> {
    let name = config.name.as_bytes();
    let name_len = u16::try_from(name.len())
        .map_err(|_| SwitchboardError::config("transmitter name too long"))?;
    let group_count = u8::try_from(config.groups.len())
        .map_err(|_| SwitchboardError::config("too many groups"))?;

    let mut buf = BytesMut::with_capacity(16 + name.len());
    buf.put_slice(WIRE_MAGIC);
    buf.put_u8(WIRE_VERSION);
    buf.put_u8(KIND_HELLO);
    buf.put_u16(name_len);
    buf.put_slice(name);
    buf.put_u8(group_count);
    for group in &config.groups {
        let group = group.as_bytes();
        let len = u16::try_from(group.len())
            .map_err(|_| SwitchboardError::config("group name too long"))?;
        buf.put_u16(len);
        buf.put_slice(group);
    }
    Ok(buf)
}

pub(crate) fn encode_frame_header(frame: &Frame, origin: Instant) -> Result<BytesMut> {
    let len = u32::try_from(frame.pixels().len())
        .map_err(|_| SwitchboardError::invalid_frame("frame too large for the wire"))?;
    let pts_us = frame.timestamp().saturating_duration_since(origin).as_micros() as u64;

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN);
    buf.put_slice(WIRE_MAGIC);
    buf.put_u8(WIRE_VERSION);
    buf.put_u8(KIND_FRAME);
    buf.put_u32(frame.format().fourcc());
    buf.put_u32(frame.width());
    buf.put_u32(frame.height());
    buf.put_u64(frame.sequence());
    buf.put_u64(pts_us);
    buf.put_u32(len);
    Ok(buf)
}
