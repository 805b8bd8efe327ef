//! Periodic tick scheduling and delivery unit lifecycle.

pub mod inflight;
pub mod runner;
pub mod state;
