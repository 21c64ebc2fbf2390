//! Protocol module containing message types, key codes, the binary codec and
//! stream framing.

pub mod codec;
pub mod framing;
pub mod keys;
pub mod messages;

pub use codec::{decode_header, decode_inbound, encode_outbound, FrameHeader, ProtocolError};
pub use framing::FrameBuffer;
pub use messages::*;
