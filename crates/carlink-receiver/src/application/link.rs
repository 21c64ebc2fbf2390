//! Link ports: the opaque transport to the dongle.
//!
//! A [`LinkConnector`] produces at most one live [`Link`] at a time.  Each
//! acquisition yields a [`LinkHandle`]: the outbound half (`link`) plus the
//! inbound routing queue (`inbound`).
//!
//! # Why an unbounded queue? (for beginners)
//!
//! The transport's reader must never wait for a slow sink; if it did, the
//! dongle's USB/TCP buffers would fill and frames would be lost at the
//! device.  An unbounded channel lets the reader push and move on, while the
//! router drains at its own pace.  The queue is per session: when the
//! session ends, the receiver is dropped and anything still queued goes with
//! it.

use std::sync::Arc;

use async_trait::async_trait;
use carlink_core::{InboundMessage, OutboundMessage};
use tokio::sync::mpsc;

use crate::application::error::LinkError;

/// One item on the inbound routing queue.
#[derive(Debug)]
pub enum LinkEvent {
    /// A decoded frame from the dongle.
    Message(InboundMessage),
    /// The link failed; no further events follow.
    Error(LinkError),
}

/// Outbound half of an established link.
#[async_trait]
pub trait Link: Send + Sync {
    /// Sends one message.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), LinkError>;

    /// Sends `msgs` in order, stopping at the first failure.
    async fn send_batch(&self, msgs: &[OutboundMessage]) -> Result<(), LinkError> {
        for msg in msgs {
            self.send(msg).await?;
        }
        Ok(())
    }
}

/// Everything produced by one successful acquisition.
pub struct LinkHandle {
    pub link: Arc<dyn Link>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

impl std::fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkHandle").finish_non_exhaustive()
    }
}

/// Discovers the device and establishes a link to it.
#[async_trait]
pub trait LinkConnector: Send + Sync {
    /// Attempts one acquisition.  Failures are expected while no device is
    /// attached; the supervisor retries.
    async fn acquire(&self) -> Result<LinkHandle, LinkError>;
}
