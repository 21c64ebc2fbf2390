//! Link adapters.
//!
//! - **`tcp`** – Talks to a dongle exposed as a TCP byte stream (for example a
//!   USB-to-TCP bridge on the head unit).
//! - **`mock`** – In-memory links with scripted failures and recorded
//!   outbound traffic.

pub mod mock;
pub mod tcp;
