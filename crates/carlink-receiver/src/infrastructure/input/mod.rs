//! Local input sources.

pub mod console;
