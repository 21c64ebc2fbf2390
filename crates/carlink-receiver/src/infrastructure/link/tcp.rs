//! TCP link to the dongle.
//!
//! The dongle is reached through a byte-stream bridge (for example a
//! USB-to-TCP relay running next to the head unit).  Each acquisition opens
//! one connection and splits it:
//!
//! ```text
//!   TcpStream ─┬─ OwnedReadHalf  ──► reader task ──► FrameBuffer ──► LinkEvent queue
//!              └─ OwnedWriteHalf ◄── TcpLink::send / send_batch (Mutex-serialised)
//! ```
//!
//! The reader task ends on EOF, on a read error, on a corrupt frame header, or
//! when the `TcpLink` is dropped.  It reports the first three as a terminal
//! [`LinkEvent::Error`].  A frame with a sound header but an unparseable
//! payload is skipped by the [`FrameBuffer`] and the link stays up.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use carlink_core::protocol::FrameBuffer;
use carlink_core::{encode_outbound, OutboundMessage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

use crate::application::error::LinkError;
use crate::application::link::{Link, LinkConnector, LinkEvent, LinkHandle};

/// Default time allowed for the TCP connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

const READ_CHUNK: usize = 16 * 1024;

/// Opens a [`TcpLink`] to a fixed address on every acquisition.
#[derive(Debug, Clone)]
pub struct TcpLinkConnector {
    addr: String,
    connect_timeout: Duration,
}

impl TcpLinkConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl LinkConnector for TcpLinkConnector {
    async fn acquire(&self) -> Result<LinkHandle, LinkError> {
        let stream = match time::timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(LinkError::Unavailable(format!("{}: {e}", self.addr))),
            Err(_) => {
                return Err(LinkError::Unavailable(format!(
                    "{}: connect timed out after {:?}",
                    self.addr, self.connect_timeout
                )))
            }
        };
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        let (tx, rx) = mpsc::unbounded_channel();
        let reader_token = CancellationToken::new();
        tokio::spawn(read_loop(read_half, tx, reader_token.clone()));
        debug!(%peer, "tcp link established");

        let link = TcpLink {
            peer,
            writer: Mutex::new(write_half),
            _reader: reader_token.drop_guard(),
        };
        Ok(LinkHandle {
            link: Arc::new(link),
            inbound: rx,
        })
    }
}

/// The send side of an established TCP link.
pub struct TcpLink {
    peer: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    /// Stops the reader task when the link is dropped.
    _reader: DropGuard,
}

impl TcpLink {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl Link for TcpLink {
    async fn send(&self, msg: &OutboundMessage) -> Result<(), LinkError> {
        let bytes = encode_outbound(msg).map_err(LinkError::Encode)?;
        trace!(peer = %self.peer, msg_type = ?msg.message_type(), len = bytes.len(), "send");
        self.write(&bytes).await
    }

    /// Encodes the whole batch first, then writes it in one call so no other
    /// sender can interleave.
    async fn send_batch(&self, msgs: &[OutboundMessage]) -> Result<(), LinkError> {
        let mut bytes = Vec::new();
        for msg in msgs {
            bytes.extend(encode_outbound(msg).map_err(LinkError::Encode)?);
        }
        trace!(peer = %self.peer, count = msgs.len(), len = bytes.len(), "send batch");
        self.write(&bytes).await
    }
}

/// Reads the stream, reassembles frames, and feeds the inbound queue.
async fn read_loop(
    mut reader: OwnedReadHalf,
    tx: mpsc::UnboundedSender<LinkEvent>,
    cancel: CancellationToken,
) {
    let mut frames = FrameBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    let terminal = loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            read = reader.read(&mut chunk) => read,
        };
        match read {
            Ok(0) => break LinkError::Closed,
            Ok(n) => {
                frames.extend(&chunk[..n]);
                match forward_frames(&mut frames, &tx) {
                    Ok(true) => {}
                    Ok(false) => return,
                    Err(e) => break LinkError::Desync(e),
                }
            }
            Err(e) => break LinkError::Io(e),
        }
    };

    warn!(error = %terminal, "tcp link reader stopped");
    let _ = tx.send(LinkEvent::Error(terminal));
}

/// Pushes every complete frame onto `tx`.  `Ok(false)` means the receiving
/// side has gone away.
fn forward_frames(
    frames: &mut FrameBuffer,
    tx: &mpsc::UnboundedSender<LinkEvent>,
) -> Result<bool, carlink_core::ProtocolError> {
    while let Some(msg) = frames.next_message()? {
        if tx.send(LinkEvent::Message(msg)).is_err() {
            return Ok(false);
        }
    }
    Ok(true)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
