#![forbid(unsafe_code)]
#![expect(
    clippy::expect_used,
    reason = "test utility crate: a broken fixture should panic loudly"
)]

//! Shared test utilities for the brook workspace.

pub mod fixtures;
pub mod http_server;

pub use fixtures::{pattern, pcm_tone};
pub use http_server::{AudioServer, TestHttpServer, audio_router};
