#![forbid(unsafe_code)]

//! # Brook
//!
//! Facade crate for streaming compressed audio over HTTP into a small ring of
//! output buffers.
//!
//! ## Quick start
//!
//! ```ignore
//! use brook::prelude::*;
//!
//! let mut player = Player::with_http(PlayerConfig::default(), demuxers, engines)?;
//! player.start(Url::parse("https://example.com/song.mp3")?)?;
//! player.wait_until_stopped(Duration::from_secs(600));
//! ```
//!
//! The demuxer and the output engine are supplied by the caller through
//! [`queue::DemuxerFactory`] and [`queue::EngineFactory`].

// ── Re-export sub-crates ────────────────────────────────────────────────

pub mod net {
    pub use brook_net::*;
}

pub mod queue {
    pub use brook_queue::*;
}

// ── Prelude ─────────────────────────────────────────────────────────────

pub mod prelude {
    pub use brook_net::{Feed, HttpClient, HttpFeed, NetError, NetOptions};
    pub use brook_queue::{
        AudioBuffer, AudioFormat, ContainerFormat, DemuxerFactory, EngineFactory,
        EngineNotifier, Event, OutputEngine, Player, PlayerConfig, PlayerEvent, PlayerState,
        QueueConfig, QueueError, QueueResult,
    };
}
