//! Sink ports: consumers of raw elementary-stream bytes.
//!
//! Decoding and rendering happen outside the receiver.  A sink accepts the
//! bytes exactly as the dongle delivered them and may fail on malformed
//! input.  Sinks are synchronous, like the decoders they front.
//!
//! A [`SinkSet`] is created by a [`SinkFactory`] each time a session opens
//! and is owned by that session's router; it is stopped before a replacement
//! is installed and when the router exits.
//!
//! A video decoder may also report remote-control buttons.  Such a sink is
//! built with a [`KeyIngress`](crate::application::key_forwarder::KeyIngress)
//! and reports each button with `push_press`, so its keys share the queue
//! and ordering of every other key source.

use carlink_core::SessionParams;

use crate::application::error::SinkError;

/// Consumer of the H.264 elementary stream.
#[cfg_attr(test, mockall::automock)]
pub trait VideoSink: Send {
    /// Forwards one chunk of stream bytes, unmodified.
    fn send(&mut self, data: &[u8]) -> Result<(), SinkError>;

    /// Releases the sink.  Called exactly once, before the sink is dropped.
    fn stop(&mut self);
}

/// Consumer of PCM audio.
#[cfg_attr(test, mockall::automock)]
pub trait AudioSink: Send {
    fn send(&mut self, data: &[u8]) -> Result<(), SinkError>;

    fn stop(&mut self);
}

/// The video and audio sink of one session.
pub struct SinkSet {
    pub video: Box<dyn VideoSink>,
    pub audio: Box<dyn AudioSink>,
}

impl SinkSet {
    pub fn new(video: Box<dyn VideoSink>, audio: Box<dyn AudioSink>) -> Self {
        Self { video, audio }
    }

    /// Stops both sinks, video first.
    pub fn stop(&mut self) {
        self.video.stop();
        self.audio.stop();
    }
}

/// Creates a fresh [`SinkSet`] for a newly opened session.
#[cfg_attr(test, mockall::automock)]
pub trait SinkFactory: Send + Sync {
    /// `params` are the display parameters the dongle settled on in `Open`.
    fn create(&self, params: &SessionParams) -> Result<SinkSet, SinkError>;
}
