//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration, fills in defaults
//! for anything missing, and converts it into the application-layer
//! settings (supervisor timing, handshake batches, touch scale).

pub mod config;
