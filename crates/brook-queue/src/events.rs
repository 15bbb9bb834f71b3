//! Event bus for observing a player without taking its lock.

use brook_net::NetError;
use tokio::sync::broadcast;

use crate::{
    error::QueueError,
    format::AudioFormat,
    state::{PlayerState, StopReason},
    types::BufferId,
};

/// Playback-side events.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum PlayerEvent {
    StateChanged {
        from: PlayerState,
        to: PlayerState,
    },
    FormatDetected(AudioFormat),
    /// The format list offered a high-efficiency variant that replaced the
    /// first detected format.
    FormatUpgraded(AudioFormat),
    EngineConstructed {
        buffer_count: usize,
        buffer_size: usize,
    },
    BufferEnqueued {
        buffer: BufferId,
        bytes: usize,
        packets: usize,
        in_flight: usize,
    },
    BufferConsumed {
        buffer: BufferId,
        in_flight: usize,
    },
    /// The engine ran dry before the stream ended.
    Underrun,
    Finished(StopReason),
    Failed(QueueError),
}

/// Network-side events.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum StreamEvent {
    ResponseHeaders {
        expected_length: Option<u64>,
        total_bytes: Option<u64>,
    },
    Progress {
        received: u64,
        total: Option<u64>,
    },
    Complete {
        received: u64,
    },
    Error(NetError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Player(PlayerEvent),
    Stream(StreamEvent),
}

impl From<PlayerEvent> for Event {
    fn from(e: PlayerEvent) -> Self {
        Self::Player(e)
    }
}

impl From<StreamEvent> for Event {
    fn from(e: StreamEvent) -> Self {
        Self::Stream(e)
    }
}

/// Broadcast bus shared by the driver, the engine callbacks and the caller.
///
/// `publish` never blocks; without subscribers events are dropped and slow
/// subscribers see `RecvError::Lagged`.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish<E: Into<Event>>(&self, event: E) {
        let _ = self.tx.send(event.into());
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
