//! SessionSupervisor: the connection state machine.
//!
//! ```text
//!              ┌────────────── any transport error / inbound end ──────────────┐
//!              ▼                                                               │
//!   Disconnected ──► Discovering ──acquire ok──► Negotiating ──Open──► Connected
//!                        ▲  │ acquire failed          │ send error
//!                        └──┘ (retry)                 └──────────► Disconnected
//! ```
//!
//! One iteration of the loop is one session:
//!
//! 1. **Discover** – call [`LinkConnector::acquire`] until it succeeds,
//!    sleeping `retry_interval` between attempts.  Never gives up.
//! 2. **Install** – wrap the link in an [`ActiveSession`], publish it through
//!    the [`SessionSlot`] and spawn the session's [`MessageRouter`].
//! 3. **Negotiate** – send the startup batch every `startup_interval` until
//!    the router reports the first `Open` or the session closes.
//! 4. **Connected** – wait for the session to close.
//! 5. **Teardown** – clear the slot, close the session, join the router
//!    (which stops the sinks), then loop.
//!
//! The router is always joined before the next link is acquired, so at most
//! one link and one sink set are live at any instant.

use std::sync::Arc;
use std::time::Duration;

use carlink_core::protocol::messages::StartupMessage;
use carlink_core::{KeyCode, OutboundMessage, RawTouchEvent, SessionParams, TouchScale};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::heartbeat::{HeartbeatMonitor, DEFAULT_HEARTBEAT_INTERVAL};
use crate::application::key_forwarder::KeyForwarder;
use crate::application::link::{LinkConnector, LinkHandle};
use crate::application::router::MessageRouter;
use crate::application::session::{ActiveSession, SessionSlot, SessionState};
use crate::application::sinks::SinkFactory;
use crate::application::touch_forwarder::TouchForwarder;

// ── Handshake profile ─────────────────────────────────────────────────────────

/// Name the dongle advertises to the phone unless configured otherwise.
pub const DEFAULT_BOX_NAME: &str = "carlink";

/// Default display density reported to the dongle.
pub const DEFAULT_DPI: u32 = 160;

/// The two fixed handshake batches.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeProfile {
    /// Sent every `startup_interval` until the device opens the session.
    pub startup: Vec<OutboundMessage>,
    /// Sent once, right after the first `Open`.
    pub opened: Vec<OutboundMessage>,
}

impl HandshakeProfile {
    /// Builds the standard batches for a head unit with the given display.
    pub fn new(params: SessionParams, dpi: u32, box_name: &str) -> Self {
        let msg = OutboundMessage::Startup;
        Self {
            startup: vec![
                msg(StartupMessage::send_number("/tmp/screen_dpi", dpi)),
                msg(StartupMessage::Open(params)),
                msg(StartupMessage::send_number("/tmp/night_mode", 0)),
                msg(StartupMessage::send_number("/tmp/hand_drive_mode", 0)),
                msg(StartupMessage::send_number("/tmp/charge_mode", 0)),
                msg(StartupMessage::send_text("/tmp/box_name", box_name)),
            ],
            opened: vec![msg(StartupMessage::send_number("/tmp/night_mode", 0))],
        }
    }
}

impl Default for HandshakeProfile {
    fn default() -> Self {
        Self::new(SessionParams::default(), DEFAULT_DPI, DEFAULT_BOX_NAME)
    }
}

// ── Supervisor ────────────────────────────────────────────────────────────────

/// Timing knobs for the supervisor and its tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    /// Pause between failed acquisitions.
    pub retry_interval: Duration,
    /// Cadence of the startup batch while negotiating.
    pub startup_interval: Duration,
    pub heartbeat_interval: Duration,
    /// How long [`SupervisorHandle::shutdown`] waits for tasks to finish.
    pub shutdown_timeout: Duration,
    pub touch_scale: TouchScale,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(500),
            startup_interval: Duration::from_secs(1),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            shutdown_timeout: Duration::from_secs(5),
            touch_scale: TouchScale::default(),
        }
    }
}

/// Owns the device connection's lifecycle.
pub struct SessionSupervisor {
    connector: Arc<dyn LinkConnector>,
    sinks: Arc<dyn SinkFactory>,
    slot: Arc<SessionSlot>,
    startup: Arc<[OutboundMessage]>,
    opened: Arc<[OutboundMessage]>,
    config: SupervisorConfig,
    shutdown: CancellationToken,
}

impl SessionSupervisor {
    pub fn new(
        connector: Arc<dyn LinkConnector>,
        sinks: Arc<dyn SinkFactory>,
        profile: HandshakeProfile,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            connector,
            sinks,
            slot: Arc::new(SessionSlot::new()),
            startup: profile.startup.into(),
            opened: profile.opened.into(),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Shared current-session handle.
    pub fn slot(&self) -> Arc<SessionSlot> {
        Arc::clone(&self.slot)
    }

    /// Root token; cancelling it stops every task.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs sessions back to back until shutdown.
    pub async fn run(&self) {
        loop {
            self.slot.set_state(SessionState::Disconnected);
            let Some(handle) = self.discover().await else {
                break;
            };
            self.run_session(handle).await;
            if self.shutdown.is_cancelled() {
                break;
            }
        }
        self.slot.set_state(SessionState::Disconnected);
        debug!("supervisor stopped");
    }

    /// Spawns the supervisor loop, heartbeat and both forwarders.
    pub fn spawn_all(
        self,
        keys: mpsc::UnboundedReceiver<KeyCode>,
        touches: mpsc::UnboundedReceiver<RawTouchEvent>,
    ) -> SupervisorHandle {
        let shutdown = self.shutdown.clone();
        let slot = Arc::clone(&self.slot);
        let heartbeat = HeartbeatMonitor::new(Arc::clone(&slot), self.config.heartbeat_interval);
        let key_forwarder = KeyForwarder::new(Arc::clone(&slot));
        let touch_forwarder = TouchForwarder::new(Arc::clone(&slot), self.config.touch_scale);
        let shutdown_timeout = self.config.shutdown_timeout;

        let tasks = vec![
            ("heartbeat", tokio::spawn(heartbeat.run(shutdown.clone()))),
            ("keys", tokio::spawn(key_forwarder.run(keys, shutdown.clone()))),
            ("touch", tokio::spawn(touch_forwarder.run(touches, shutdown.clone()))),
            ("supervisor", tokio::spawn(async move { self.run().await })),
        ];

        SupervisorHandle {
            shutdown,
            slot,
            tasks,
            shutdown_timeout,
        }
    }

    // ── Session phases ────────────────────────────────────────────────────────

    async fn discover(&self) -> Option<LinkHandle> {
        self.slot.set_state(SessionState::Discovering);
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            let result = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                result = self.connector.acquire() => result,
            };
            match result {
                Ok(handle) => {
                    info!(attempts, "found device");
                    return Some(handle);
                }
                Err(e) => debug!(attempts, error = %e, "no device yet"),
            }
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                _ = time::sleep(self.config.retry_interval) => {}
            }
        }
    }

    async fn run_session(&self, handle: LinkHandle) {
        let LinkHandle { link, inbound } = handle;
        let session = Arc::new(ActiveSession::new(link, &self.shutdown));
        self.slot.install(Arc::clone(&session));
        self.slot.set_state(SessionState::Negotiating);

        let router = MessageRouter::new(
            Arc::clone(&session),
            inbound,
            Arc::clone(&self.sinks),
            Arc::clone(&self.opened),
        );
        let router_task = tokio::spawn(router.run());

        if self.negotiate(&session).await {
            self.slot.set_state(SessionState::Connected);
            info!(session = %session.id(), "connection started");
            session.closed().await;
        }

        // Teardown: stop publishing the session before anything else.
        self.slot.clear();
        session.close();
        match router_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(session = %session.id(), error = %e, "router ended"),
            Err(e) => warn!(session = %session.id(), error = %e, "router task failed"),
        }
        self.slot.set_state(SessionState::Disconnected);
        if self.shutdown.is_cancelled() {
            info!(session = %session.id(), "session closed for shutdown");
        } else {
            info!(session = %session.id(), "lost device");
        }
    }

    /// Returns `true` once the device has opened the session, `false` if the
    /// session closed first.
    async fn negotiate(&self, session: &ActiveSession) -> bool {
        let mut ticker = time::interval(self.config.startup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = session.closed() => return false,
                _ = session.wait_started() => return true,
                _ = ticker.tick() => {
                    debug!(session = %session.id(), "sending startup batch");
                    if let Err(e) = session.send_batch(&self.startup).await {
                        // Any failure while negotiating ends the session.
                        session.report_link_error(&e);
                        return false;
                    }
                }
            }
        }
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Running supervisor and its tasks.
pub struct SupervisorHandle {
    shutdown: CancellationToken,
    slot: Arc<SessionSlot>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    shutdown_timeout: Duration,
}

impl SupervisorHandle {
    pub fn slot(&self) -> Arc<SessionSlot> {
        Arc::clone(&self.slot)
    }

    pub fn state(&self) -> SessionState {
        self.slot.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.slot.watch_state()
    }

    /// Cancels every task and joins them, waiting at most the configured
    /// shutdown timeout.  Returns `true` if all tasks finished in time.
    pub async fn shutdown(self) -> bool {
        let SupervisorHandle {
            shutdown,
            tasks,
            shutdown_timeout,
            ..
        } = self;
        shutdown.cancel();
        info!(tasks = tasks.len(), "shutting down");

        let join_all = async move {
            for (name, task) in tasks {
                if let Err(e) = task.await {
                    warn!(task = name, error = %e, "task ended abnormally");
                }
            }
        };
        match time::timeout(shutdown_timeout, join_all).await {
            Ok(()) => true,
            Err(_) => {
                warn!(timeout = ?shutdown_timeout, "shutdown timed out");
                false
            }
        }
    }
}
