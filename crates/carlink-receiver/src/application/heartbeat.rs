//! HeartbeatMonitor: periodic liveness frames.
//!
//! Each tick sends one `Heartbeat` through the current session.  The monitor
//! never waits for an ack and never evicts on silence; only a transport
//! error from the link ends the session.  Anything else is suppressed so a
//! single bad tick does not change session state.

use std::sync::Arc;
use std::time::Duration;

use carlink_core::OutboundMessage;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::application::error::SendError;
use crate::application::session::SessionSlot;

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Result of one heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No session is installed.
    Skipped,
    Sent,
    /// The send failed without severing the link.
    Suppressed,
    /// The link is gone; the session has been closed.
    Severed,
}

/// Sends heartbeats through a [`SessionSlot`].
pub struct HeartbeatMonitor {
    slot: Arc<SessionSlot>,
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(slot: Arc<SessionSlot>, interval: Duration) -> Self {
        Self { slot, interval }
    }

    /// Performs a single tick.
    pub async fn tick(&self) -> TickOutcome {
        match self.slot.send(&OutboundMessage::Heartbeat).await {
            Ok(()) => {
                trace!("heartbeat sent");
                TickOutcome::Sent
            }
            Err(SendError::NoSession) => TickOutcome::Skipped,
            Err(e) if e.is_transport() => {
                debug!(error = %e, "heartbeat found link severed");
                TickOutcome::Severed
            }
            Err(e) => {
                debug!(error = %e, "heartbeat failed; ignored");
                TickOutcome::Suppressed
            }
        }
    }

    /// Ticks every `interval` until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        debug!("heartbeat stopped");
    }
}
