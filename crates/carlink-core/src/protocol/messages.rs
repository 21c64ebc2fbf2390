//! All dongle protocol message types.
//!
//! Inbound messages are produced by the dongle and consumed exactly once by
//! the receiver's message router; outbound messages are produced by the
//! receiver (handshake, heartbeat, key and touch forwarders).

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Magic value opening every frame header.
pub const MAGIC: u32 = 0x55AA_55AA;

/// Total size of the common frame header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Largest payload the decoder accepts.  Key frames of high-resolution video
/// stay well below this; anything larger indicates a desynchronised stream.
pub const MAX_PAYLOAD_SIZE: usize = 4 * 1024 * 1024;

// ── Message type codes ────────────────────────────────────────────────────────

/// Message type codes understood by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum MessageType {
    Open = 0x01,
    Plugged = 0x02,
    Phase = 0x03,
    Unplugged = 0x04,
    Touch = 0x05,
    VideoData = 0x06,
    AudioData = 0x07,
    CarPlay = 0x08,
    MultiTouch = 0x17,
    SendFile = 0x99,
    HeartBeat = 0xAA,
}

impl TryFrom<u32> for MessageType {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::Open),
            0x02 => Ok(MessageType::Plugged),
            0x03 => Ok(MessageType::Phase),
            0x04 => Ok(MessageType::Unplugged),
            0x05 => Ok(MessageType::Touch),
            0x06 => Ok(MessageType::VideoData),
            0x07 => Ok(MessageType::AudioData),
            0x08 => Ok(MessageType::CarPlay),
            0x17 => Ok(MessageType::MultiTouch),
            0x99 => Ok(MessageType::SendFile),
            0xAA => Ok(MessageType::HeartBeat),
            _ => Err(()),
        }
    }
}

// ── Session parameters ────────────────────────────────────────────────────────

/// OPEN (0x01) payload: display and session parameters.
///
/// Sent by the receiver as part of the startup batch and echoed back by the
/// dongle once the phone session is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Projected display width in pixels.
    pub width: u32,
    /// Projected display height in pixels.
    pub height: u32,
    /// Requested video frame rate.
    pub video_frame_rate: u32,
    /// Video format selector (5 = H.264 elementary stream).
    pub format: u32,
    /// Maximum USB packet size the head unit accepts.
    pub packet_max: u32,
    /// Dongle firmware generation the handshake targets.
    pub box_version: u32,
    /// Phone work mode (2 = projection).
    pub phone_work_mode: u32,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            width: 800,
            height: 480,
            video_frame_rate: 30,
            format: 5,
            packet_max: 49152,
            box_version: 2,
            phone_work_mode: 2,
        }
    }
}

// ── Inbound payloads ──────────────────────────────────────────────────────────

/// VIDEO_DATA (0x06): one chunk of the H.264 elementary stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub flags: u32,
    /// Raw elementary-stream bytes, forwarded unmodified to the video sink.
    pub data: Vec<u8>,
}

/// What follows the fixed AUDIO_DATA fields.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioPayload {
    /// Raw PCM samples for the audio sink.
    Pcm(Vec<u8>),
    /// Single-byte stream command (start/stop of a channel, Siri, ...).
    Command(u8),
    /// Volume ramp duration in seconds.
    VolumeDuration(f32),
}

/// AUDIO_DATA (0x07): one chunk of audio or an audio control command.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub decode_type: u32,
    pub volume: f32,
    pub audio_type: u32,
    pub payload: AudioPayload,
}

/// Every message the dongle can deliver to the receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Session is up; carries the parameters the dongle settled on.
    Open(SessionParams),
    /// A phone was attached to the dongle.
    Plugged { phone_type: u32, wifi: Option<u32> },
    /// Dongle-internal phase change.
    Phase(u32),
    /// The phone was detached from the dongle.
    Unplugged,
    VideoData(VideoFrame),
    AudioData(AudioFrame),
    /// The dongle's answer to an outbound heartbeat.
    HeartbeatAck,
    /// Any other control frame, kept opaque.
    Control { message_type: u32, payload: Vec<u8> },
}

impl InboundMessage {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Open(_) => "open",
            InboundMessage::Plugged { .. } => "plugged",
            InboundMessage::Phase(_) => "phase",
            InboundMessage::Unplugged => "unplugged",
            InboundMessage::VideoData(_) => "video",
            InboundMessage::AudioData(_) => "audio",
            InboundMessage::HeartbeatAck => "heartbeat-ack",
            InboundMessage::Control { .. } => "control",
        }
    }
}

// ── Outbound payloads ─────────────────────────────────────────────────────────

/// Touch phase carried in each MultiTouch entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum TouchAction {
    Up = 0,
    Down = 1,
    Move = 2,
}

impl TouchAction {
    /// Maps a raw pointer tag to a touch action.
    ///
    /// `"up"` and `"down"` map to their namesakes; every other tag,
    /// including `"move"`, is treated as a move.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "up" => TouchAction::Up,
            "down" => TouchAction::Down,
            _ => TouchAction::Move,
        }
    }
}

/// One contact point inside a [`OutboundMessage::TouchBatch`].
///
/// Coordinates are normalised to `0.0..=1.0` of the projected display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Touch {
    pub x: f32,
    pub y: f32,
    pub action: TouchAction,
}

/// Handshake frames sent before and right after the session opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupMessage {
    /// Announce the head unit's display parameters.
    Open(SessionParams),
    /// Write a small configuration file on the dongle.
    SendFile { path: String, content: Vec<u8> },
}

impl StartupMessage {
    /// A file whose content is a single little-endian `u32`.
    pub fn send_number(path: &str, value: u32) -> Self {
        StartupMessage::SendFile {
            path: path.to_string(),
            content: value.to_le_bytes().to_vec(),
        }
    }

    /// A file whose content is the UTF-8 bytes of `text`.
    pub fn send_text(path: &str, text: &str) -> Self {
        StartupMessage::SendFile {
            path: path.to_string(),
            content: text.as_bytes().to_vec(),
        }
    }
}

/// Every message the receiver sends to the dongle.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Periodic liveness frame.
    Heartbeat,
    /// A single key code, packed as a little-endian `u32`.
    KeyEvent(u32),
    /// All pointer events drained in one forwarder cycle, in arrival order.
    TouchBatch(Vec<Touch>),
    /// Handshake frame from a startup or opened batch.
    Startup(StartupMessage),
}

impl OutboundMessage {
    /// Returns the [`MessageType`] this message is framed with.
    pub fn message_type(&self) -> MessageType {
        match self {
            OutboundMessage::Heartbeat => MessageType::HeartBeat,
            OutboundMessage::KeyEvent(_) => MessageType::CarPlay,
            OutboundMessage::TouchBatch(_) => MessageType::MultiTouch,
            OutboundMessage::Startup(StartupMessage::Open(_)) => MessageType::Open,
            OutboundMessage::Startup(StartupMessage::SendFile { .. }) => MessageType::SendFile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_try_from_known_codes() {
        assert_eq!(MessageType::try_from(0x01), Ok(MessageType::Open));
        assert_eq!(MessageType::try_from(0x17), Ok(MessageType::MultiTouch));
        assert_eq!(MessageType::try_from(0xAA), Ok(MessageType::HeartBeat));
    }

    #[test]
    fn test_message_type_try_from_unknown_code_fails() {
        assert!(MessageType::try_from(0x1234).is_err());
    }

    #[test]
    fn test_touch_action_from_tag_maps_known_and_unknown_tags() {
        // Arrange / Act / Assert
        assert_eq!(TouchAction::from_tag("up"), TouchAction::Up);
        assert_eq!(TouchAction::from_tag("down"), TouchAction::Down);
        assert_eq!(TouchAction::from_tag("move"), TouchAction::Move);
        assert_eq!(TouchAction::from_tag("hover"), TouchAction::Move);
        assert_eq!(TouchAction::from_tag(""), TouchAction::Move);
    }

    #[test]
    fn test_touch_action_wire_values() {
        assert_eq!(TouchAction::Up as u32, 0);
        assert_eq!(TouchAction::Down as u32, 1);
        assert_eq!(TouchAction::Move as u32, 2);
    }

    #[test]
    fn test_outbound_message_types() {
        assert_eq!(OutboundMessage::Heartbeat.message_type(), MessageType::HeartBeat);
        assert_eq!(OutboundMessage::KeyEvent(7).message_type(), MessageType::CarPlay);
        assert_eq!(
            OutboundMessage::TouchBatch(Vec::new()).message_type(),
            MessageType::MultiTouch
        );
        assert_eq!(
            OutboundMessage::Startup(StartupMessage::send_number("/tmp/x", 1)).message_type(),
            MessageType::SendFile
        );
    }

    #[test]
    fn test_send_number_packs_little_endian() {
        let msg = StartupMessage::send_number("/tmp/screen_dpi", 160);
        assert_eq!(
            msg,
            StartupMessage::SendFile {
                path: "/tmp/screen_dpi".to_string(),
                content: vec![160, 0, 0, 0],
            }
        );
    }
}
