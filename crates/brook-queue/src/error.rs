use brook_net::NetError;
use thiserror::Error;

/// Failure reported by a [`Demuxer`](crate::Demuxer).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DemuxError {
    #[error("unsupported container: {0}")]
    Unsupported(String),
    #[error("malformed stream: {0}")]
    Malformed(String),
    #[error("property unavailable: {0}")]
    Property(String),
}

/// Failure reported by an [`OutputEngine`](crate::OutputEngine).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    #[error("output engine rejected format: {0}")]
    Format(String),
    #[error("output engine operation failed: {0}")]
    Operation(String),
    #[error("output engine has been torn down")]
    Closed,
}

/// Errors raised by the buffering and playback core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QueueError {
    #[error("connection failed: {0}")]
    ConnectionFailed(#[from] NetError),

    #[error("demux failed: {0}")]
    ParseFailed(#[from] DemuxError),

    #[error("output engine construction failed: {0}")]
    EngineCreateFailed(EngineError),

    #[error("output engine failed: {0}")]
    Engine(EngineError),

    #[error("packet of {size} bytes exceeds buffer capacity of {capacity} bytes")]
    OversizedPacket { size: usize, capacity: usize },

    #[error("packet [{offset}, +{size}) lies outside a {len}-byte chunk")]
    PacketOutOfBounds { offset: usize, size: usize, len: usize },

    #[error("stream ended before any audio packet was produced")]
    NoAudioDataFound,

    #[error("output engine has not been constructed")]
    EngineNotReady,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn driver thread: {0}")]
    Spawn(String),

    #[error("cancelled")]
    Cancelled,
}

impl QueueError {
    /// Errors after which buffered audio cannot be trusted; the engine is torn
    /// down at once instead of draining.
    pub fn is_buffer_integrity(&self) -> bool {
        matches!(
            self,
            Self::OversizedPacket { .. } | Self::PacketOutOfBounds { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
