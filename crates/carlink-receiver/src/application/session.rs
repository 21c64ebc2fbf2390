//! The current-session handle.
//!
//! # Sharing one link between five tasks (for beginners)
//!
//! The supervisor, router, heartbeat and both forwarders all need the link
//! of the *current* session, but only the supervisor ever replaces it.  The
//! link, its `started` flag and its close signal are therefore bundled into
//! one [`ActiveSession`] and published through a [`SessionSlot`]:
//!
//! ```text
//!   supervisor ──install/clear──► SessionSlot { Option<Arc<ActiveSession>> }
//!                                      │ current()  (clone of the Arc)
//!          heartbeat, forwarders ◄─────┘
//! ```
//!
//! Readers clone the `Arc` under a short read lock and then work on their own
//! copy, so nobody can observe a link from one session paired with the flags
//! of another, and no lock is held across an `.await`.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use carlink_core::OutboundMessage;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::error::{LinkError, SendError};
use crate::application::link::Link;

// ── Session state ─────────────────────────────────────────────────────────────

/// Observable lifecycle state of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No link.  Entered at start-up and after every teardown.
    Disconnected,
    /// Trying to acquire a link.
    Discovering,
    /// Link acquired; sending the startup batch until the device opens.
    Negotiating,
    /// The device opened the session; A/V is flowing.
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Discovering => "discovering",
            SessionState::Negotiating => "negotiating",
            SessionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

// ── ActiveSession ─────────────────────────────────────────────────────────────

/// One logical attachment of the device: exactly one link for its lifetime.
pub struct ActiveSession {
    id: Uuid,
    link: Arc<dyn Link>,
    started: watch::Sender<bool>,
    closed: CancellationToken,
}

impl ActiveSession {
    /// Creates a session whose close signal is a child of `parent`, so
    /// process shutdown closes it too.
    pub fn new(link: Arc<dyn Link>, parent: &CancellationToken) -> Self {
        let (started, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            link,
            started,
            closed: parent.child_token(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_started(&self) -> bool {
        *self.started.borrow()
    }

    /// Sets the `started` flag.  Returns `true` only for the call that
    /// actually flipped it.
    pub fn mark_started(&self) -> bool {
        self.started.send_if_modified(|started| {
            if *started {
                false
            } else {
                *started = true;
                true
            }
        })
    }

    /// Resolves once [`mark_started`](Self::mark_started) has been called.
    pub async fn wait_started(&self) {
        let mut rx = self.started.subscribe();
        // The sender lives in `self`, so this cannot fail.
        let _ = rx.wait_for(|started| *started).await;
    }

    /// Closes the session because of `err`.  Idempotent; only the first
    /// report is logged at `warn`.
    pub fn report_link_error(&self, err: &LinkError) {
        if self.closed.is_cancelled() {
            debug!(session = %self.id, error = %err, "link error on closed session");
        } else {
            warn!(session = %self.id, error = %err, "link error; closing session");
            self.closed.cancel();
        }
    }

    /// Closes the session without an error (teardown or shutdown).
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session is closed for any reason.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Token cancelled when the session closes.
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Sends through this session's link; a transport failure closes the
    /// session before the error is returned.
    pub async fn send(&self, msg: &OutboundMessage) -> Result<(), LinkError> {
        let result = self.link.send(msg).await;
        self.observe(result)
    }

    /// Batch variant of [`send`](Self::send).
    pub async fn send_batch(&self, msgs: &[OutboundMessage]) -> Result<(), LinkError> {
        let result = self.link.send_batch(msgs).await;
        self.observe(result)
    }

    fn observe(&self, result: Result<(), LinkError>) -> Result<(), LinkError> {
        if let Err(e) = &result {
            if e.is_transport() {
                self.report_link_error(e);
            }
        }
        result
    }
}

impl fmt::Debug for ActiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSession")
            .field("id", &self.id)
            .field("started", &self.is_started())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ── SessionSlot ───────────────────────────────────────────────────────────────

/// How a forwarder's send attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Sent,
    /// The message was dropped: no session, or the send failed.
    Dropped,
}

/// Single-writer / multi-reader handle to the current [`ActiveSession`].
pub struct SessionSlot {
    current: RwLock<Option<Arc<ActiveSession>>>,
    state: watch::Sender<SessionState>,
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSlot {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            current: RwLock::new(None),
            state,
        }
    }

    /// The installed session, if any.
    pub fn current(&self) -> Option<Arc<ActiveSession>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs `session`, returning the one it replaced.
    pub fn install(&self, session: Arc<ActiveSession>) -> Option<Arc<ActiveSession>> {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(session)
    }

    /// Removes the installed session.
    pub fn clear(&self) -> Option<Arc<ActiveSession>> {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Publishes a state transition.  Repeating the current state is a no-op
    /// for watchers.
    pub fn set_state(&self, next: SessionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                debug!(from = %state, to = %next, "session state");
                *state = next;
                true
            }
        });
    }

    /// Receiver that observes every published transition.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Sends through the current session.
    ///
    /// # Errors
    ///
    /// [`SendError::NoSession`] when nothing is installed or the installed
    /// session is already closing; [`SendError::Link`] when the link fails.
    /// Transport failures have already closed the session when this returns.
    pub async fn send(&self, msg: &OutboundMessage) -> Result<(), SendError> {
        let session = self.current().ok_or(SendError::NoSession)?;
        if session.is_closed() {
            return Err(SendError::NoSession);
        }
        session.send(msg).await.map_err(SendError::from)
    }

    /// Forwarder send policy: failures drop the message and are logged, never
    /// retried and never propagated.
    pub async fn forward(&self, msg: &OutboundMessage, what: &'static str) -> ForwardOutcome {
        match self.send(msg).await {
            Ok(()) => ForwardOutcome::Sent,
            Err(SendError::NoSession) => {
                debug!(what, "no active session; input dropped");
                ForwardOutcome::Dropped
            }
            Err(e) if e.is_transport() => {
                // The session has already been closed by `send`.
                debug!(what, error = %e, "link lost while forwarding; input dropped");
                ForwardOutcome::Dropped
            }
            Err(e) => {
                warn!(what, error = %e, "could not forward input");
                ForwardOutcome::Dropped
            }
        }
    }
}
