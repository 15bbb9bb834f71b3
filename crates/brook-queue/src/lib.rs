#![forbid(unsafe_code)]

//! Buffering core of the brook streaming player.
//!
//! Bytes from a [`brook_net::Feed`] go through a [`Demuxer`] into a
//! [`Scheduler`] that packs packets into a fixed pool of [`AudioBuffer`]s.
//! Full buffers move to an [`OutputEngine`] and come back through an
//! [`EngineNotifier`] once rendered; a buffer that has not come back cannot be
//! refilled, which is the only backpressure in the system. A
//! [`PlaybackMachine`] decides when the engine starts, pauses for an underrun
//! and drains at the end. [`Player`] runs all of it on a dedicated driver
//! thread.
//!
//! ```no_run
//! use brook_queue::{AudioFormat, Player, PlayerConfig, RawDemuxerFactory};
//! # fn engines() -> Box<dyn brook_queue::EngineFactory> { unimplemented!() }
//!
//! # async fn run() -> Result<(), brook_queue::QueueError> {
//! let demuxers = RawDemuxerFactory::new(AudioFormat::pcm(44_100, 2, 16));
//! let mut player = Player::with_http(PlayerConfig::default(), Box::new(demuxers), engines())?;
//! player.start("http://localhost:8080/track.pcm".parse().expect("url"))?;
//! # Ok(())
//! # }
//! ```

mod bridge;
mod buffer;
mod config;
mod demux;
mod driver;
mod engine;
mod error;
mod events;
mod format;
mod player;
mod pool;
mod scheduler;
mod state;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use crate::{
    bridge::{EngineBridge, resolve_buffer_size},
    buffer::AudioBuffer,
    config::{PlayerConfig, QueueConfig},
    demux::{
        DemuxSink, Demuxer, DemuxerFactory, PropertyKind, PropertySnapshot, RawDemuxer,
        RawDemuxerFactory, StreamProperties,
    },
    engine::{EngineFactory, EngineNotifier, OutputEngine},
    error::{DemuxError, EngineError, QueueError, QueueResult},
    events::{Event, EventBus, PlayerEvent, StreamEvent},
    format::{AudioCodec, AudioFormat, ContainerFormat},
    player::Player,
    pool::{BufferPool, SlotState},
    scheduler::{Placement, RawPlacement, Scheduler},
    state::{EngineCommand, EofPlan, PlaybackMachine, PlayerState, StartRequest, StopReason},
    types::{BufferId, PacketDescriptor, QueueStats, StreamPosition},
};
