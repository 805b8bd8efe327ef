//! Integration tests for delivery, scheduling, and the end-to-end service run.

mod delivery;
mod service;
