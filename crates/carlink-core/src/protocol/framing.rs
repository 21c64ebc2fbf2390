//! Reassembly of inbound frames from an arbitrary byte stream.
//!
//! Stream transports deliver bytes in chunks that rarely line up with frame
//! boundaries.  [`FrameBuffer`] accumulates chunks and hands back complete
//! messages one at a time:
//!
//! ```text
//!  read() ─► extend() ─► [ partial | frame | frame | partial ] ─► next_message()
//! ```

use crate::protocol::codec::{decode_header, decode_inbound, ProtocolError};
use crate::protocol::messages::InboundMessage;
use tracing::warn;

/// Accumulates raw bytes and yields decoded [`InboundMessage`]s.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    skipped: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet consumed.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Frames with a valid header whose payload could not be decoded.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Decodes the next complete message, if one is buffered.
    ///
    /// Returns `Ok(None)` when more bytes are needed.  A complete frame whose
    /// payload does not parse is dropped (exactly its own length) and the
    /// next frame is tried; the stream position is still known.
    ///
    /// # Errors
    ///
    /// A corrupt header (bad magic, type check mismatch, oversized length)
    /// means the stream is out of sync.  The buffer is cleared and the error
    /// returned; the caller should treat the link as broken.
    pub fn next_message(&mut self) -> Result<Option<InboundMessage>, ProtocolError> {
        loop {
            let header = match decode_header(&self.buf) {
                Ok(header) => header,
                Err(ProtocolError::InsufficientData { .. }) => return Ok(None),
                Err(e) => {
                    warn!(dropped = self.buf.len(), error = %e, "inbound stream out of sync");
                    self.buf.clear();
                    return Err(e);
                }
            };
            let frame_len = header.frame_len();
            if self.buf.len() < frame_len {
                return Ok(None);
            }
            let decoded = decode_inbound(&self.buf[..frame_len]);
            self.buf.drain(..frame_len);
            match decoded {
                Ok((msg, _)) => return Ok(Some(msg)),
                Err(e) => {
                    self.skipped += 1;
                    warn!(
                        msg_type = header.msg_type,
                        len = frame_len,
                        error = %e,
                        "skipping malformed frame"
                    );
                }
            }
        }
    }
}
