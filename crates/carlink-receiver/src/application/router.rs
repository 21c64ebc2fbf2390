//! MessageRouter: drains one session's inbound queue into its sinks.
//!
//! The router is the single consumer of the routing queue.  It processes one
//! message at a time, in arrival order, so video and audio writes keep the
//! relative order in which the link delivered them even though the two
//! streams interleave.
//!
//! | Message      | Action                                                    |
//! |--------------|-----------------------------------------------------------|
//! | `Open`       | first time only: replace sinks, send opened batch, start  |
//! | `VideoData`  | bytes to the video sink; failure ends the session         |
//! | `AudioData`  | PCM to the audio sink; failure is logged and skipped      |
//! | anything else| ignored                                                   |
//!
//! The router owns the session's [`SinkSet`].  Sinks are stopped before they
//! are replaced and when the router exits, whatever the reason.
//!
//! Sinks only exist once `Open` has arrived, so media that precedes `Open`
//! is dropped.  Receivers that keep one decoder alive for the whole process
//! would feed those frames to it instead; here no sink exists to take them.

use std::sync::Arc;

use carlink_core::protocol::messages::{AudioFrame, AudioPayload, VideoFrame};
use carlink_core::{InboundMessage, OutboundMessage, SessionParams};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::application::error::RouterError;
use crate::application::link::LinkEvent;
use crate::application::session::ActiveSession;
use crate::application::sinks::{SinkFactory, SinkSet};

/// Router for one session.
pub struct MessageRouter {
    session: Arc<ActiveSession>,
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
    factory: Arc<dyn SinkFactory>,
    opened_batch: Arc<[OutboundMessage]>,
    sinks: Option<SinkSet>,
}

impl MessageRouter {
    /// `opened_batch` is sent once, right after the first `Open`.
    pub fn new(
        session: Arc<ActiveSession>,
        inbound: mpsc::UnboundedReceiver<LinkEvent>,
        factory: Arc<dyn SinkFactory>,
        opened_batch: Arc<[OutboundMessage]>,
    ) -> Self {
        Self {
            session,
            inbound,
            factory,
            opened_batch,
            sinks: None,
        }
    }

    /// Runs until the session closes or routing fails.
    ///
    /// Returns `Ok(())` when the session was closed from outside.  Any error
    /// has already closed the session when this returns.  Sinks are stopped
    /// on every exit path.
    pub async fn run(mut self) -> Result<(), RouterError> {
        let result = self.drain().await;
        if let Some(mut sinks) = self.sinks.take() {
            sinks.stop();
        }
        if let Err(e) = &result {
            match e {
                RouterError::Link(link_err) => self.session.report_link_error(link_err),
                other => {
                    warn!(session = %self.session.id(), error = %other, "router stopped; closing session");
                    self.session.close();
                }
            }
        }
        result
    }

    async fn drain(&mut self) -> Result<(), RouterError> {
        let closed = self.session.close_token();
        loop {
            let event = tokio::select! {
                biased;
                _ = closed.cancelled() => return Ok(()),
                event = self.inbound.recv() => event,
            };
            match event {
                Some(LinkEvent::Message(msg)) => self.dispatch(msg).await?,
                Some(LinkEvent::Error(e)) => return Err(RouterError::Link(e)),
                None => return Err(RouterError::InboundClosed),
            }
        }
    }

    /// Routes a single message.
    ///
    /// # Errors
    ///
    /// Video sink failures, sink creation failures and a failed opened batch
    /// are returned; everything else is handled here.
    pub async fn dispatch(&mut self, msg: InboundMessage) -> Result<(), RouterError> {
        match msg {
            InboundMessage::Open(params) => self.on_open(params).await,
            InboundMessage::VideoData(frame) => self.on_video(frame),
            InboundMessage::AudioData(frame) => {
                self.on_audio(frame);
                Ok(())
            }
            other => {
                debug!(kind = other.kind(), "ignoring inbound message");
                Ok(())
            }
        }
    }

    async fn on_open(&mut self, params: SessionParams) -> Result<(), RouterError> {
        if self.session.is_started() {
            debug!("duplicate open ignored");
            return Ok(());
        }
        if let Some(mut old) = self.sinks.take() {
            old.stop();
        }
        let sinks = self.factory.create(&params).map_err(RouterError::SinkSetup)?;
        self.sinks = Some(sinks);
        self.session
            .send_batch(&self.opened_batch)
            .await
            .map_err(RouterError::Handshake)?;
        self.session.mark_started();
        info!(
            session = %self.session.id(),
            width = params.width,
            height = params.height,
            fps = params.video_frame_rate,
            "connected"
        );
        Ok(())
    }

    fn on_video(&mut self, frame: VideoFrame) -> Result<(), RouterError> {
        match self.sinks.as_mut() {
            Some(sinks) => {
                trace!(len = frame.data.len(), "video frame");
                sinks.video.send(&frame.data).map_err(RouterError::VideoSink)
            }
            None => {
                trace!(len = frame.data.len(), "video before open dropped");
                Ok(())
            }
        }
    }

    fn on_audio(&mut self, frame: AudioFrame) {
        let data = match frame.payload {
            AudioPayload::Pcm(data) => data,
            AudioPayload::Command(cmd) => {
                debug!(cmd, audio_type = frame.audio_type, "audio command");
                return;
            }
            AudioPayload::VolumeDuration(secs) => {
                debug!(secs, "audio volume ramp");
                return;
            }
        };
        let Some(sinks) = self.sinks.as_mut() else {
            trace!(len = data.len(), "audio before open dropped");
            return;
        };
        if let Err(e) = sinks.audio.send(&data) {
            warn!(error = %e, len = data.len(), "audio sink rejected frame; continuing");
        }
    }
}
