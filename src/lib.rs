//! idlewatchd - user daemon that reports idle episodes by email.
//!
//! Polls the time since the last keyboard or mouse input and sends exactly
//! one notification per idle episode, plus notices when the service starts,
//! stops, exits unexpectedly or crashes.

pub mod config;
pub mod episode;
pub mod idle;
pub mod lifecycle;
pub mod logging;
pub mod monitor;
pub mod notify;
