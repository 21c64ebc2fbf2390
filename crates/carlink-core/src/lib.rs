//! # carlink-core
//!
//! Shared library for the carlink receiver containing the dongle wire
//! protocol, the binary codec, named key codes, and the touch normalisation
//! rules.
//!
//! It has zero dependencies on async runtimes, USB stacks, or sockets, so
//! everything here can be unit tested with plain byte slices.
//!
//! # Architecture overview (for beginners)
//!
//! A projection dongle sits between a phone and a head unit.  The head unit
//! (this project) talks to the dongle with small binary frames: it sends
//! handshake files, heartbeats, key presses, and multi-touch batches; the
//! dongle answers with an `Open` control frame followed by a continuous
//! stream of video and audio elementary-stream frames.
//!
//! - **`protocol`** – How bytes travel over the link.  Every frame is a
//!   16-byte header plus a payload; [`protocol::codec`] turns typed
//!   [`InboundMessage`]s / [`OutboundMessage`]s into bytes and back.
//!
//! - **`domain`** – Pure input rules with no I/O.  The important piece is the
//!   touch mapping: raw device-space pointer events become normalised
//!   [`Touch`] entries.

pub mod domain;
pub mod protocol;

pub use domain::touch::{RawTouchEvent, TouchScale};
pub use protocol::codec::{decode_inbound, encode_outbound, ProtocolError};
pub use protocol::keys::KeyCode;
pub use protocol::messages::{InboundMessage, OutboundMessage, SessionParams, Touch, TouchAction};
