//! Infrastructure layer for the receiver.
//!
//! Contains the concrete adapters behind the application-layer ports.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `carlink_core`, but MUST NOT be imported by the `application` layer
//! (tests excepted).
//!
//! # Sub-modules
//!
//! - **`link`** – [`link::tcp::TcpLinkConnector`] reaches the dongle through a
//!   TCP bridge; [`link::mock`] provides scripted in-memory links for tests.
//! - **`sinks`** – [`sinks::file::FileSinkFactory`] writes raw elementary
//!   streams to files or FIFOs for an external player; [`sinks::mock`]
//!   records every write.
//! - **`input`** – Console input source for keys and touches.
//! - **`storage`** – TOML configuration.

pub mod input;
pub mod link;
pub mod sinks;
pub mod storage;
