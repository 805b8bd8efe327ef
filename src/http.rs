//! HTTP delivery session and retry policy.

pub mod client;
pub mod retry;
