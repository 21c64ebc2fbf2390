//! Error types shared across the application layer.
//!
//! Every failure that can reach the session is classified once, here, instead
//! of being caught wholesale at each call site:
//!
//! | Error          | Class         | Effect                                   |
//! |----------------|---------------|------------------------------------------|
//! | transport      | `Transport`   | session disconnects, supervisor retries  |
//! | rejected frame | `Recoverable` | logged, session continues                |
//! | audio sink     | n/a           | logged, session continues                |
//! | video sink     | n/a           | routed as [`RouterError`], disconnects   |

use carlink_core::ProtocolError;
use thiserror::Error;

/// Whether an error means the link itself is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The link is severed; the session must be torn down.
    Transport,
    /// A single operation failed; the link is still usable.
    Recoverable,
}

/// Errors reported by a [`Link`](crate::application::link::Link) or while
/// acquiring one.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No device answered during acquisition.
    #[error("no device available: {0}")]
    Unavailable(String),

    /// The link was closed by the device or by the transport.
    #[error("link closed")]
    Closed,

    /// An I/O error on the established link.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The inbound byte stream could not be framed; the stream is lost.
    #[error("inbound stream corrupted: {0}")]
    Desync(#[source] ProtocolError),

    /// An outbound message could not be encoded; nothing was written.
    #[error("could not encode outbound message: {0}")]
    Encode(#[source] ProtocolError),

    /// The device refused a single frame but kept the link open.
    #[error("frame rejected: {0}")]
    Rejected(String),
}

impl LinkError {
    /// Classifies this error for the disconnect policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            LinkError::Unavailable(_)
            | LinkError::Closed
            | LinkError::Io(_)
            | LinkError::Desync(_) => ErrorClass::Transport,
            LinkError::Encode(_) | LinkError::Rejected(_) => ErrorClass::Recoverable,
        }
    }

    /// Shorthand for `class() == ErrorClass::Transport`.
    pub fn is_transport(&self) -> bool {
        self.class() == ErrorClass::Transport
    }
}

/// Errors raised by a video or audio sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink could not consume the bytes it was given.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The sink was already stopped.
    #[error("sink stopped")]
    Stopped,
}

/// Errors from sending through the current-session handle.
#[derive(Debug, Error)]
pub enum SendError {
    /// No session is installed, or the installed one is already closing.
    #[error("no active session")]
    NoSession,

    #[error(transparent)]
    Link(#[from] LinkError),
}

impl SendError {
    /// `true` when the failure severed the link.
    pub fn is_transport(&self) -> bool {
        matches!(self, SendError::Link(e) if e.is_transport())
    }
}

/// Reasons a [`MessageRouter`](crate::application::router::MessageRouter)
/// stopped before its session was closed.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The link delivered a terminal error.
    #[error("link failed: {0}")]
    Link(#[source] LinkError),

    /// The inbound queue ended without a terminal error.
    #[error("inbound stream ended")]
    InboundClosed,

    /// The video sink rejected a frame.
    #[error("video sink failed: {0}")]
    VideoSink(#[source] SinkError),

    /// Sinks could not be created for a new session.
    #[error("could not create sinks: {0}")]
    SinkSetup(#[source] SinkError),

    /// The opened batch could not be sent after `Open`.
    #[error("could not acknowledge open: {0}")]
    Handshake(#[source] LinkError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_classified_as_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert_eq!(LinkError::Io(io).class(), ErrorClass::Transport);
        assert_eq!(LinkError::Closed.class(), ErrorClass::Transport);
        assert_eq!(
            LinkError::Desync(ProtocolError::BadMagic(0)).class(),
            ErrorClass::Transport
        );
    }

    #[test]
    fn test_frame_level_errors_are_recoverable() {
        assert_eq!(
            LinkError::Rejected("busy".into()).class(),
            ErrorClass::Recoverable
        );
        let encode = LinkError::Encode(ProtocolError::PayloadTooLarge { size: 9, max: 8 });
        assert!(!encode.is_transport());
    }

    #[test]
    fn test_send_error_is_transport_only_for_severed_link() {
        assert!(SendError::Link(LinkError::Closed).is_transport());
        assert!(!SendError::Link(LinkError::Rejected("x".into())).is_transport());
        assert!(!SendError::NoSession.is_transport());
    }
}
