//! KeyForwarder: discrete key codes to outbound `KeyEvent` messages.
//!
//! Every code received is sent immediately, as exactly one message, in the
//! order received.  No batching, no de-duplication.  A failed send drops the
//! key (see [`SessionSlot::forward`]) and the forwarder carries on.
//!
//! Sources that only report presses (a video decoder relaying remote-control
//! buttons) use [`KeyIngress::push_press`], which queues the matching
//! `SELECT_UP` behind a `SELECT_DOWN`.

use std::sync::Arc;

use carlink_core::{KeyCode, OutboundMessage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::application::session::{ForwardOutcome, SessionSlot};

/// Producer side of the key queue, handed to input sources.
#[derive(Debug, Clone)]
pub struct KeyIngress {
    tx: mpsc::UnboundedSender<KeyCode>,
}

impl KeyIngress {
    /// Queues a key.  Returns `false` once the forwarder has stopped.
    pub fn push(&self, code: KeyCode) -> bool {
        self.tx.send(code).is_ok()
    }

    /// Queues a press reported by a source that never sends the release.
    pub fn push_press(&self, code: KeyCode) -> bool {
        if !self.push(code) {
            return false;
        }
        if code == KeyCode::SELECT_DOWN {
            return self.push(KeyCode::SELECT_UP);
        }
        true
    }
}

/// Creates the key queue.
pub fn key_channel() -> (KeyIngress, mpsc::UnboundedReceiver<KeyCode>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (KeyIngress { tx }, rx)
}

/// Forwards key codes through the current session.
pub struct KeyForwarder {
    slot: Arc<SessionSlot>,
}

impl KeyForwarder {
    pub fn new(slot: Arc<SessionSlot>) -> Self {
        Self { slot }
    }

    /// Sends one key.
    pub async fn forward(&self, code: KeyCode) -> ForwardOutcome {
        trace!(code = code.0, name = code.name().unwrap_or("-"), "key");
        self.slot
            .forward(&OutboundMessage::KeyEvent(code.into()), "key")
            .await
    }

    /// Forwards keys until the queue closes or `shutdown` is cancelled.
    pub async fn run(self, mut keys: mpsc::UnboundedReceiver<KeyCode>, shutdown: CancellationToken) {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = keys.recv() => next,
            };
            match next {
                Some(code) => {
                    self.forward(code).await;
                }
                None => break,
            }
        }
        debug!("key forwarder stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session::ActiveSession;
    use crate::infrastructure::link::mock::{MockFailure, MockLink};

    fn forwarder_with_link() -> (KeyForwarder, Arc<MockLink>) {
        let slot = Arc::new(SessionSlot::new());
        let (link, handle) = MockLink::new();
        slot.install(Arc::new(ActiveSession::new(handle.link, &CancellationToken::new())));
        (KeyForwarder::new(slot), link)
    }

    #[tokio::test]
    async fn test_each_key_produces_exactly_one_message() {
        // Arrange
        let (forwarder, link) = forwarder_with_link();

        // Act
        let outcome = forwarder.forward(KeyCode::SELECT_DOWN).await;

        // Assert
        assert_eq!(outcome, ForwardOutcome::Sent);
        assert_eq!(link.sent(), vec![OutboundMessage::KeyEvent(104)]);
    }

    #[tokio::test]
    async fn test_keys_are_sent_in_receipt_order_without_dedup() {
        // Arrange
        let (forwarder, link) = forwarder_with_link();
        let (ingress, rx) = key_channel();
        for code in [5, 5, 200, 101] {
            assert!(ingress.push(KeyCode(code)));
        }
        drop(ingress);

        // Act – the queue closes after the four keys
        forwarder.run(rx, CancellationToken::new()).await;

        // Assert
        assert_eq!(
            link.sent(),
            vec![
                OutboundMessage::KeyEvent(5),
                OutboundMessage::KeyEvent(5),
                OutboundMessage::KeyEvent(200),
                OutboundMessage::KeyEvent(101),
            ]
        );
    }

    #[test]
    fn test_push_press_releases_select() {
        // Arrange
        let (ingress, mut rx) = key_channel();

        // Act
        assert!(ingress.push_press(KeyCode::SELECT_DOWN));
        assert!(ingress.push_press(KeyCode::HOME));

        // Assert
        assert_eq!(rx.try_recv().unwrap(), KeyCode::SELECT_DOWN);
        assert_eq!(rx.try_recv().unwrap(), KeyCode::SELECT_UP);
        assert_eq!(rx.try_recv().unwrap(), KeyCode::HOME);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_push_press_after_forwarder_stopped_fails() {
        let (ingress, rx) = key_channel();
        drop(rx);
        assert!(!ingress.push_press(KeyCode::SELECT_DOWN));
    }

    #[tokio::test]
    async fn test_send_failure_does_not_stop_forwarder() {
        // Arrange
        let (forwarder, link) = forwarder_with_link();
        let (ingress, rx) = key_channel();
        link.fail_next(1, MockFailure::Recoverable);
        ingress.push(KeyCode(1));
        ingress.push(KeyCode(2));
        drop(ingress);

        // Act
        forwarder.run(rx, CancellationToken::new()).await;

        // Assert – first key dropped, second delivered
        assert_eq!(link.sent(), vec![OutboundMessage::KeyEvent(2)]);
    }

    #[tokio::test]
    async fn test_forward_without_session_is_dropped() {
        let forwarder = KeyForwarder::new(Arc::new(SessionSlot::new()));
        assert_eq!(forwarder.forward(KeyCode::HOME).await, ForwardOutcome::Dropped);
    }

    #[test]
    fn test_run_forwards_each_key_as_it_arrives_and_then_waits() {
        // Arrange
        let (forwarder, link) = forwarder_with_link();
        let (ingress, rx) = key_channel();
        let shutdown = CancellationToken::new();
        let mut run = tokio_test::task::spawn(forwarder.run(rx, shutdown.clone()));

        // Act / Assert – idle queue keeps the forwarder parked
        tokio_test::assert_pending!(run.poll());
        assert!(link.sent().is_empty());

        ingress.push(KeyCode::HOME);
        assert!(run.is_woken());
        tokio_test::assert_pending!(run.poll());
        assert_eq!(link.sent(), vec![OutboundMessage::KeyEvent(200)]);

        shutdown.cancel();
        tokio_test::assert_ready!(run.poll());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let forwarder = KeyForwarder::new(Arc::new(SessionSlot::new()));
        let (_ingress, rx) = key_channel();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        // Must return even though the queue is still open.
        forwarder.run(rx, shutdown).await;
    }
}
