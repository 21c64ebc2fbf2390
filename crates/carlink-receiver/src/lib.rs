//! carlink-receiver library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the receiver do? (for beginners)
//!
//! The receiver is the head-unit side of a phone projection setup.  A dongle
//! bridges the phone; the receiver:
//!
//! 1. Keeps trying to reach the dongle until a link comes up ("found device").
//! 2. Repeats a small startup batch every second until the dongle answers
//!    with `Open` ("connection started").
//! 3. Routes the incoming video and audio frames to their sinks, strictly in
//!    arrival order, on a task of its own so the link is never blocked.
//! 4. Sends a heartbeat on a fixed period and forwards key presses and
//!    multi-touch batches from the local input sources.
//! 5. On any transport error tears the session down ("lost device") and
//!    starts over from step 1.
//!
//! ```text
//!                 ┌──────────────── SessionSupervisor ────────────────┐
//!  LinkConnector ─┤ acquire ─► negotiate ─► connected ─► teardown ─┐  │
//!                 │    ▲                                           │  │
//!                 │    └───────────────────────────────────────────┘  │
//!                 └───────────────────────────────────────────────────┘
//!  Link inbound ──► MessageRouter ──► VideoSink / AudioSink
//!  HeartbeatMonitor, KeyForwarder, TouchForwarder ──► SessionSlot ──► Link
//! ```

/// Application layer: supervisor, router, heartbeat, forwarders and ports.
pub mod application;

/// Infrastructure layer: TCP link, file sinks, console input, configuration.
pub mod infrastructure;
