//! Pure input rules with no I/O.

pub mod touch;
