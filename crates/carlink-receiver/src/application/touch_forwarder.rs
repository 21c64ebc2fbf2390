//! TouchForwarder: bursts of raw pointer events to `TouchBatch` messages.
//!
//! # Cycle algorithm
//!
//! ```text
//!   wait for first event ─► drain the rest of the backlog ─► normalise ─► send one batch
//!          ▲                                                                   │
//!          └─────────────────────── clear accumulator ◄────────────────────────┘
//! ```
//!
//! Every event drained in one cycle travels in one message, in arrival order,
//! and cycle N's batch is sent before cycle N+1 starts.  The forwarder
//! suspends on the queue instead of polling, so an empty queue produces no
//! batch and burns no CPU.

use std::sync::Arc;

use carlink_core::{OutboundMessage, RawTouchEvent, TouchScale};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::application::session::{ForwardOutcome, SessionSlot};

/// Producer side of the touch queue; the seam a UI layer feeds.
#[derive(Debug, Clone)]
pub struct TouchIngress {
    tx: mpsc::UnboundedSender<RawTouchEvent>,
}

impl TouchIngress {
    /// Queues one pointer event in device coordinates.  Returns `false` once
    /// the forwarder has stopped.
    pub fn push(&self, x: f64, y: f64, tag: &str) -> bool {
        self.tx.send(RawTouchEvent::new(x, y, tag)).is_ok()
    }
}

/// Creates the touch queue.
pub fn touch_channel() -> (TouchIngress, mpsc::UnboundedReceiver<RawTouchEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TouchIngress { tx }, rx)
}

/// Moves everything currently queued into `acc` without waiting.
/// Returns the number of events moved.
pub fn drain_backlog(
    rx: &mut mpsc::UnboundedReceiver<RawTouchEvent>,
    acc: &mut Vec<RawTouchEvent>,
) -> usize {
    let before = acc.len();
    while let Ok(event) = rx.try_recv() {
        acc.push(event);
    }
    acc.len() - before
}

/// Builds the batch for one cycle; `None` for an empty cycle.
pub fn build_batch(events: &[RawTouchEvent], scale: &TouchScale) -> Option<OutboundMessage> {
    if events.is_empty() {
        None
    } else {
        Some(OutboundMessage::TouchBatch(scale.normalize_all(events)))
    }
}

/// Forwards touch bursts through the current session.
pub struct TouchForwarder {
    slot: Arc<SessionSlot>,
    scale: TouchScale,
}

impl TouchForwarder {
    pub fn new(slot: Arc<SessionSlot>, scale: TouchScale) -> Self {
        Self { slot, scale }
    }

    /// Sends one cycle's worth of events.  An empty cycle sends nothing.
    pub async fn forward_cycle(&self, events: &[RawTouchEvent]) -> Option<ForwardOutcome> {
        let batch = build_batch(events, &self.scale)?;
        trace!(touches = events.len(), "touch batch");
        Some(self.slot.forward(&batch, "touch").await)
    }

    /// Runs cycles until the queue closes or `shutdown` is cancelled.
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<RawTouchEvent>,
        shutdown: CancellationToken,
    ) {
        let mut acc = Vec::new();
        loop {
            acc.clear();
            let first = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                first = events.recv() => first,
            };
            match first {
                Some(event) => acc.push(event),
                None => break,
            }
            drain_backlog(&mut events, &mut acc);
            self.forward_cycle(&acc).await;
        }
        debug!("touch forwarder stopped");
    }
}
