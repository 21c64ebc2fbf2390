//! Binary codec for encoding and decoding dongle protocol frames.
//!
//! Wire format:
//! ```text
//! [magic:4][payload_len:4][msg_type:4][type_check:4][payload:N]
//! ```
//! Total header size: 16 bytes. All multi-byte values are little-endian and
//! `type_check` is the bitwise complement of `msg_type`.

use crate::protocol::messages::{
    AudioFrame, AudioPayload, InboundMessage, MessageType, OutboundMessage, SessionParams,
    StartupMessage, Touch, VideoFrame, HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE,
};
use thiserror::Error;

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice does not yet hold a complete frame.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The header does not start with [`MAGIC`].
    #[error("bad magic: 0x{0:08X}")]
    BadMagic(u32),

    /// The type check word is not the complement of the message type.
    #[error("type check mismatch for message type 0x{msg_type:X}: 0x{check:08X}")]
    TypeCheckMismatch { msg_type: u32, check: u32 },

    /// The payload could not be parsed (field missing, invalid UTF-8, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The payload exceeds [`MAX_PAYLOAD_SIZE`].
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Parsed 16-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_len: usize,
    pub msg_type: u32,
}

impl FrameHeader {
    /// Header plus payload length.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an [`OutboundMessage`] into a complete frame (header + payload).
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if the payload would exceed
/// [`MAX_PAYLOAD_SIZE`].
///
/// # Examples
///
/// ```rust
/// use carlink_core::protocol::{encode_outbound, OutboundMessage};
///
/// let bytes = encode_outbound(&OutboundMessage::KeyEvent(104)).unwrap();
/// assert_eq!(bytes.len(), 16 + 4);
/// assert_eq!(&bytes[16..], &104u32.to_le_bytes());
/// ```
pub fn encode_outbound(msg: &OutboundMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut payload = Vec::new();
    match msg {
        OutboundMessage::Heartbeat => {} // empty payload
        OutboundMessage::KeyEvent(code) => payload.extend_from_slice(&code.to_le_bytes()),
        OutboundMessage::TouchBatch(touches) => encode_touches(&mut payload, touches),
        OutboundMessage::Startup(StartupMessage::Open(params)) => {
            encode_session_params(&mut payload, params)
        }
        OutboundMessage::Startup(StartupMessage::SendFile { path, content }) => {
            encode_send_file(&mut payload, path, content)?
        }
    }
    encode_frame(msg.message_type() as u32, &payload)
}

/// Encodes an [`InboundMessage`] the way the dongle frames it.
///
/// The receiver never sends these; the encoder exists for link emulators
/// and tests that need to feed realistic byte streams.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if the payload would exceed
/// [`MAX_PAYLOAD_SIZE`].
pub fn encode_inbound(msg: &InboundMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut payload = Vec::new();
    let msg_type = match msg {
        InboundMessage::Open(params) => {
            encode_session_params(&mut payload, params);
            MessageType::Open as u32
        }
        InboundMessage::Plugged { phone_type, wifi } => {
            payload.extend_from_slice(&phone_type.to_le_bytes());
            if let Some(wifi) = wifi {
                payload.extend_from_slice(&wifi.to_le_bytes());
            }
            MessageType::Plugged as u32
        }
        InboundMessage::Phase(phase) => {
            payload.extend_from_slice(&phase.to_le_bytes());
            MessageType::Phase as u32
        }
        InboundMessage::Unplugged => MessageType::Unplugged as u32,
        InboundMessage::VideoData(frame) => {
            payload.extend_from_slice(&frame.width.to_le_bytes());
            payload.extend_from_slice(&frame.height.to_le_bytes());
            payload.extend_from_slice(&frame.flags.to_le_bytes());
            payload.extend_from_slice(&(frame.data.len() as u32).to_le_bytes());
            payload.extend_from_slice(&0u32.to_le_bytes()); // reserved
            payload.extend_from_slice(&frame.data);
            MessageType::VideoData as u32
        }
        InboundMessage::AudioData(frame) => {
            payload.extend_from_slice(&frame.decode_type.to_le_bytes());
            payload.extend_from_slice(&frame.volume.to_le_bytes());
            payload.extend_from_slice(&frame.audio_type.to_le_bytes());
            match &frame.payload {
                AudioPayload::Pcm(data) => payload.extend_from_slice(data),
                AudioPayload::Command(cmd) => payload.push(*cmd),
                AudioPayload::VolumeDuration(d) => payload.extend_from_slice(&d.to_le_bytes()),
            }
            MessageType::AudioData as u32
        }
        InboundMessage::HeartbeatAck => MessageType::HeartBeat as u32,
        InboundMessage::Control { message_type, payload: p } => {
            payload.extend_from_slice(p);
            *message_type
        }
    };
    encode_frame(msg_type, &payload)
}

/// Prepends a header to `payload`.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if `payload` exceeds
/// [`MAX_PAYLOAD_SIZE`].
pub fn encode_frame(msg_type: u32, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&MAGIC.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&msg_type.to_le_bytes());
    buf.extend_from_slice(&(!msg_type).to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Parses and validates the 16-byte header at the start of `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] when fewer than 16 bytes are
/// available, and the other variants when the header is corrupt.
pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }
    let magic = read_u32(bytes, 0)?;
    if magic != MAGIC {
        return Err(ProtocolError::BadMagic(magic));
    }
    let payload_len = read_u32(bytes, 4)? as usize;
    let msg_type = read_u32(bytes, 8)?;
    let check = read_u32(bytes, 12)?;
    if check != !msg_type {
        return Err(ProtocolError::TypeCheckMismatch { msg_type, check });
    }
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload_len,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Ok(FrameHeader {
        payload_len,
        msg_type,
    })
}

/// Decodes one [`InboundMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes consumed
/// (header + payload), so the caller can advance its read cursor.
/// Unknown message types decode as [`InboundMessage::Control`].
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if the frame is incomplete,
/// and other variants if the bytes are malformed.
pub fn decode_inbound(bytes: &[u8]) -> Result<(InboundMessage, usize), ProtocolError> {
    let header = decode_header(bytes)?;
    let total = header.frame_len();
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }
    let payload = &bytes[HEADER_SIZE..total];
    let msg = decode_payload(header.msg_type, payload)?;
    Ok((msg, total))
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_session_params(buf: &mut Vec<u8>, p: &SessionParams) {
    for field in [
        p.width,
        p.height,
        p.video_frame_rate,
        p.format,
        p.packet_max,
        p.box_version,
        p.phone_work_mode,
    ] {
        buf.extend_from_slice(&field.to_le_bytes());
    }
}

fn encode_touches(buf: &mut Vec<u8>, touches: &[Touch]) {
    for (id, touch) in touches.iter().enumerate() {
        buf.extend_from_slice(&touch.x.to_le_bytes());
        buf.extend_from_slice(&touch.y.to_le_bytes());
        buf.extend_from_slice(&(touch.action as u32).to_le_bytes());
        buf.extend_from_slice(&(id as u32).to_le_bytes());
    }
}

fn encode_send_file(buf: &mut Vec<u8>, path: &str, content: &[u8]) -> Result<(), ProtocolError> {
    if path.as_bytes().contains(&0) {
        return Err(ProtocolError::MalformedPayload(format!(
            "file path contains NUL: {path:?}"
        )));
    }
    // Path length includes the trailing NUL.
    buf.extend_from_slice(&((path.len() + 1) as u32).to_le_bytes());
    buf.extend_from_slice(path.as_bytes());
    buf.push(0);
    buf.extend_from_slice(&(content.len() as u32).to_le_bytes());
    buf.extend_from_slice(content);
    Ok(())
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(msg_type: u32, p: &[u8]) -> Result<InboundMessage, ProtocolError> {
    let known = match MessageType::try_from(msg_type) {
        Ok(t) => t,
        Err(()) => {
            return Ok(InboundMessage::Control {
                message_type: msg_type,
                payload: p.to_vec(),
            })
        }
    };
    match known {
        MessageType::Open => decode_session_params(p).map(InboundMessage::Open),
        MessageType::Plugged => {
            let phone_type = read_u32(p, 0)?;
            let wifi = if p.len() >= 8 { Some(read_u32(p, 4)?) } else { None };
            Ok(InboundMessage::Plugged { phone_type, wifi })
        }
        MessageType::Phase => read_u32(p, 0).map(InboundMessage::Phase),
        MessageType::Unplugged => Ok(InboundMessage::Unplugged),
        MessageType::VideoData => decode_video(p).map(InboundMessage::VideoData),
        MessageType::AudioData => decode_audio(p).map(InboundMessage::AudioData),
        MessageType::HeartBeat => Ok(InboundMessage::HeartbeatAck),
        // Outbound-only types echoed back by the dongle carry nothing the
        // receiver acts on.
        MessageType::Touch | MessageType::CarPlay | MessageType::MultiTouch | MessageType::SendFile => {
            Ok(InboundMessage::Control {
                message_type: msg_type,
                payload: p.to_vec(),
            })
        }
    }
}

fn decode_session_params(p: &[u8]) -> Result<SessionParams, ProtocolError> {
    require_len(p, 28, "Open")?;
    Ok(SessionParams {
        width: read_u32(p, 0)?,
        height: read_u32(p, 4)?,
        video_frame_rate: read_u32(p, 8)?,
        format: read_u32(p, 12)?,
        packet_max: read_u32(p, 16)?,
        box_version: read_u32(p, 20)?,
        phone_work_mode: read_u32(p, 24)?,
    })
}

fn decode_video(p: &[u8]) -> Result<VideoFrame, ProtocolError> {
    // width, height, flags, length, reserved = 20 bytes
    require_len(p, 20, "VideoData")?;
    Ok(VideoFrame {
        width: read_u32(p, 0)?,
        height: read_u32(p, 4)?,
        flags: read_u32(p, 8)?,
        data: p[20..].to_vec(),
    })
}

fn decode_audio(p: &[u8]) -> Result<AudioFrame, ProtocolError> {
    // decode_type, volume, audio_type = 12 bytes
    require_len(p, 12, "AudioData")?;
    let decode_type = read_u32(p, 0)?;
    let volume = f32::from_le_bytes(read_array(p, 4)?);
    let audio_type = read_u32(p, 8)?;
    let rest = &p[12..];
    let payload = match rest.len() {
        1 => AudioPayload::Command(rest[0]),
        4 => AudioPayload::VolumeDuration(f32::from_le_bytes(read_array(rest, 0)?)),
        _ => AudioPayload::Pcm(rest.to_vec()),
    };
    Ok(AudioFrame {
        decode_type,
        volume,
        audio_type,
        payload,
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_array(buf: &[u8], offset: usize) -> Result<[u8; 4], ProtocolError> {
    buf.get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            ProtocolError::MalformedPayload(format!(
                "need 4 bytes at offset {offset}, got {}",
                buf.len().saturating_sub(offset)
            ))
        })
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    read_array(buf, offset).map(u32::from_le_bytes)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
