//! Mock links for unit and integration testing.
//!
//! # Why a mock link?
//!
//! The real link needs a dongle (or at least a TCP bridge) on the other end.
//! [`MockLink`] replaces it with in-memory recording:
//!
//! - Every outbound message is appended to a log that tests can read or
//!   wait on.
//! - Tests inject inbound frames with [`MockLink::deliver`] and a terminal
//!   error with [`MockLink::fail_inbound`].
//! - Sends can be scripted to fail with a transport or recoverable error.
//!
//! [`MockLinkConnector`] hands out a fresh `MockLink` on every successful
//! acquisition and keeps them all so tests can reach the link of the n-th
//! session.
//!
//! # Usage in tests
//!
//! ```ignore
//! let connector = Arc::new(MockLinkConnector::new());
//! let handle = supervisor.spawn_all(keys, touches);
//!
//! let link = connector.wait_for_link(1).await;
//! link.deliver(InboundMessage::Open(SessionParams::default()));
//! link.fail_inbound(LinkError::Closed);   // forces a reconnect
//! connector.wait_for_link(2).await;
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use carlink_core::{InboundMessage, OutboundMessage};
use tokio::sync::{mpsc, watch};

use crate::application::error::LinkError;
use crate::application::link::{Link, LinkConnector, LinkEvent, LinkHandle};

/// How long the `wait_for_*` helpers wait before panicking.
const WAIT_LIMIT: Duration = Duration::from_secs(30);

/// Kind of scripted send failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Fails with [`LinkError::Closed`].
    Transport,
    /// Fails with [`LinkError::Rejected`].
    Recoverable,
}

impl MockFailure {
    fn to_error(self) -> LinkError {
        match self {
            MockFailure::Transport => LinkError::Closed,
            MockFailure::Recoverable => LinkError::Rejected("mock rejection".to_string()),
        }
    }
}

#[derive(Default)]
struct FailureScript {
    /// Applied to every send while set.
    persistent: Option<MockFailure>,
    /// Consumed one per send before `persistent` is considered.
    queued: VecDeque<MockFailure>,
}

/// A link that records outbound messages in memory.
pub struct MockLink {
    sent: watch::Sender<Vec<OutboundMessage>>,
    failures: Mutex<FailureScript>,
    inbound: mpsc::UnboundedSender<LinkEvent>,
}

impl MockLink {
    /// Creates a link and the handle a connector would return for it.
    pub fn new() -> (Arc<MockLink>, LinkHandle) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent, _) = watch::channel(Vec::new());
        let link = Arc::new(MockLink {
            sent,
            failures: Mutex::new(FailureScript::default()),
            inbound: inbound_tx,
        });
        let handle = LinkHandle {
            link: Arc::clone(&link) as Arc<dyn Link>,
            inbound: inbound_rx,
        };
        (link, handle)
    }

    /// Snapshot of everything sent so far, in order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.borrow().clone()
    }

    /// Makes every following send fail (or succeed again with `None`).
    pub fn set_failure(&self, failure: Option<MockFailure>) {
        self.failures.lock().unwrap().persistent = failure;
    }

    /// Makes the next `count` sends fail with `failure`.
    pub fn fail_next(&self, count: usize, failure: MockFailure) {
        let mut script = self.failures.lock().unwrap();
        script.queued.extend(std::iter::repeat(failure).take(count));
    }

    /// Pushes an inbound frame onto the routing queue.  Returns `false` once
    /// the router has gone away.
    pub fn deliver(&self, msg: InboundMessage) -> bool {
        self.inbound.send(LinkEvent::Message(msg)).is_ok()
    }

    /// Pushes a terminal link error onto the routing queue.
    pub fn fail_inbound(&self, err: LinkError) -> bool {
        self.inbound.send(LinkEvent::Error(err)).is_ok()
    }

    /// Waits until at least `count` messages have been sent.
    pub async fn wait_for_sent(&self, count: usize) {
        self.wait_for_matching(count, |_| true).await;
    }

    /// Waits until at least `count` sent messages satisfy `pred`.
    pub async fn wait_for_matching(&self, count: usize, pred: fn(&OutboundMessage) -> bool) {
        let mut rx = self.sent.subscribe();
        let reached = tokio::time::timeout(
            WAIT_LIMIT,
            rx.wait_for(|sent| sent.iter().filter(|m| pred(m)).count() >= count),
        )
        .await;
        assert!(
            matches!(reached, Ok(Ok(_))),
            "mock link: fewer than {count} matching messages sent"
        );
    }

    fn next_failure(&self) -> Option<MockFailure> {
        let mut script = self.failures.lock().unwrap();
        script.queued.pop_front().or(script.persistent)
    }
}

#[async_trait]
impl Link for MockLink {
    async fn send(&self, msg: &OutboundMessage) -> Result<(), LinkError> {
        if let Some(failure) = self.next_failure() {
            return Err(failure.to_error());
        }
        self.sent.send_modify(|sent| sent.push(msg.clone()));
        Ok(())
    }
}

/// A connector that hands out [`MockLink`]s.
pub struct MockLinkConnector {
    links: watch::Sender<Vec<Arc<MockLink>>>,
    attempts: AtomicUsize,
    scripted_failures: AtomicUsize,
    available: AtomicBool,
    next_link_failure: Mutex<Option<MockFailure>>,
}

impl Default for MockLinkConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLinkConnector {
    /// A connector whose device is present from the start.
    pub fn new() -> Self {
        let (links, _) = watch::channel(Vec::new());
        Self {
            links,
            attempts: AtomicUsize::new(0),
            scripted_failures: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            next_link_failure: Mutex::new(None),
        }
    }

    /// Simulates attaching or detaching the device.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Makes the next `count` acquisitions fail.
    pub fn fail_next(&self, count: usize) {
        self.scripted_failures.store(count, Ordering::SeqCst);
    }

    /// The next link handed out fails every send with `failure`.
    pub fn fail_sends_on_next_link(&self, failure: MockFailure) {
        *self.next_link_failure.lock().unwrap() = Some(failure);
    }

    /// Number of `acquire` calls so far, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The `n`-th link handed out, counting from 1.
    pub fn link(&self, n: usize) -> Option<Arc<MockLink>> {
        n.checked_sub(1)
            .and_then(|i| self.links.borrow().get(i).cloned())
    }

    /// Waits for the `n`-th link (counting from 1) to be handed out.
    pub async fn wait_for_link(&self, n: usize) -> Arc<MockLink> {
        let mut rx = self.links.subscribe();
        let reached = tokio::time::timeout(WAIT_LIMIT, rx.wait_for(|links| links.len() >= n))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);
        assert!(reached, "mock connector: link #{n} was never acquired");
        self.link(n).expect("link present after wait")
    }
}

#[async_trait]
impl LinkConnector for MockLinkConnector {
    async fn acquire(&self) -> Result<LinkHandle, LinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(LinkError::Unavailable("mock device absent".to_string()));
        }
        let scripted = self
            .scripted_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted {
            return Err(LinkError::Unavailable("scripted failure".to_string()));
        }

        let (link, handle) = MockLink::new();
        if let Some(failure) = self.next_link_failure.lock().unwrap().take() {
            link.set_failure(Some(failure));
        }
        self.links.send_modify(|links| links.push(link));
        Ok(handle)
    }
}
