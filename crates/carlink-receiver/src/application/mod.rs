//! Application layer of the receiver.
//!
//! Everything here depends only on `carlink_core` and on the ports defined in
//! this layer ([`link::Link`], [`link::LinkConnector`], [`sinks::VideoSink`],
//! [`sinks::AudioSink`], [`sinks::SinkFactory`]).  Concrete adapters are
//! injected from `infrastructure` at construction time, which keeps every
//! use case unit-testable with in-memory doubles.
//!
//! - **`session`** – The current-session handle shared by all tasks, and the
//!   observable [`session::SessionState`].
//! - **`supervisor`** – The discover → negotiate → connected → teardown loop.
//! - **`router`** – Drains the inbound routing queue into the sinks.
//! - **`heartbeat`** – Periodic liveness frames.
//! - **`key_forwarder`** / **`touch_forwarder`** – Local input to outbound
//!   messages.

pub mod error;
pub mod heartbeat;
pub mod key_forwarder;
pub mod link;
pub mod router;
pub mod session;
pub mod sinks;
pub mod supervisor;
pub mod touch_forwarder;
