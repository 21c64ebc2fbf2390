//! Sink adapters.

pub mod file;
pub mod mock;
