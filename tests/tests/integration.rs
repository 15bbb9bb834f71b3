//! All integration tests for brook
#![expect(
    clippy::unwrap_used,
    reason = "integration test crate: unwraps are acceptable in test code"
)]

mod common;
mod brook_net;
mod brook_queue;
