use std::ops::Range;

use crate::error::{QueueError, QueueResult};

/// Index of a buffer slot in the pool, `0..N`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) usize);

impl BufferId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Location of one compressed packet.
///
/// Demuxers report `offset` relative to the chunk they were fed; once stored,
/// the offset is relative to the start of the owning buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketDescriptor {
    pub offset: usize,
    pub byte_size: usize,
    /// Frame count for formats with a variable number of frames per packet.
    pub variable_frames: Option<u32>,
}

impl PacketDescriptor {
    pub fn new(offset: usize, byte_size: usize) -> Self {
        Self {
            offset,
            byte_size,
            variable_frames: None,
        }
    }

    #[must_use]
    pub fn with_variable_frames(mut self, frames: u32) -> Self {
        self.variable_frames = Some(frames);
        self
    }

    pub fn end(&self) -> usize {
        self.offset + self.byte_size
    }

    /// Bytes this descriptor points at.
    ///
    /// # Errors
    ///
    /// [`QueueError::PacketOutOfBounds`] if the descriptor overruns `bytes`.
    pub fn slice<'a>(&self, bytes: &'a [u8]) -> QueueResult<&'a [u8]> {
        self.offset
            .checked_add(self.byte_size)
            .and_then(|end| bytes.get(self.offset..end))
            .ok_or(QueueError::PacketOutOfBounds {
                offset: self.offset,
                size: self.byte_size,
                len: bytes.len(),
            })
    }
}

/// Where the stream is, in bytes of the source file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamPosition {
    /// Total file length: response length plus the seek offset.
    pub total_bytes_expected: Option<u64>,
    pub bytes_received: u64,
    /// Offset the current request started at.
    pub seek_byte_offset: u64,
    /// First byte of audio data, as reported by the demuxer.
    pub audio_data_start_offset: Option<u64>,
    /// Size of the audio data region, as reported by the demuxer.
    pub audio_data_byte_count: Option<u64>,
    length_corrected: bool,
}

impl StreamPosition {
    pub fn new(seek_byte_offset: u64, file_length: Option<u64>) -> Self {
        Self {
            total_bytes_expected: file_length,
            seek_byte_offset,
            ..Self::default()
        }
    }

    /// Correct the expected total from the first response. Later calls are
    /// ignored. Returns whether the correction was applied.
    pub fn apply_response_length(&mut self, expected_length: Option<u64>) -> bool {
        if self.length_corrected {
            return false;
        }
        self.length_corrected = true;
        if let Some(len) = expected_length {
            self.total_bytes_expected = Some(len + self.seek_byte_offset);
        }
        true
    }

    pub fn record_bytes(&mut self, len: usize) {
        self.bytes_received += len as u64;
    }

    /// Absolute offset in the file of the next byte to arrive.
    pub fn file_offset(&self) -> u64 {
        self.seek_byte_offset + self.bytes_received
    }

    /// Byte range of the file that holds playable audio, once its end is known.
    pub fn playable_range(&self) -> Option<Range<u64>> {
        let start = self.audio_data_start_offset.unwrap_or(0);
        let end = match self.audio_data_byte_count {
            Some(count) => start + count,
            None => self.total_bytes_expected?,
        };
        Some(start..end.max(start))
    }

    /// Fraction of the file received so far, in `0.0..=1.0`.
    pub fn progress(&self) -> Option<f64> {
        let total = self.total_bytes_expected.filter(|&t| t > 0)?;
        let ratio = self.file_offset() as f64 / total as f64;
        Some(ratio.min(1.0))
    }
}

/// Counters maintained by the scheduler and the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub packets: u64,
    pub bytes: u64,
    pub rotations: u64,
    pub enqueued: u64,
    pub consumed: u64,
    pub underruns: u64,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(PacketDescriptor::new(0, 4), 10, true)]
    #[case(PacketDescriptor::new(6, 4), 10, true)]
    #[case(PacketDescriptor::new(7, 4), 10, false)]
    #[case(PacketDescriptor::new(usize::MAX, 2), 10, false)]
    #[case(PacketDescriptor::new(10, 0), 10, true)]
    fn slice_bounds(#[case] desc: PacketDescriptor, #[case] len: usize, #[case] ok: bool) {
        let bytes = vec![0u8; len];
        assert_eq!(desc.slice(&bytes).is_ok(), ok);
    }

    #[test]
    fn response_length_is_applied_once_with_seek_offset() {
        let mut pos = StreamPosition::new(1000, None);
        assert!(pos.apply_response_length(Some(9000)));
        assert_eq!(pos.total_bytes_expected, Some(10_000));
        assert!(!pos.apply_response_length(Some(5)));
        assert_eq!(pos.total_bytes_expected, Some(10_000));
    }

    #[test]
    fn unknown_response_length_keeps_configured_total() {
        let mut pos = StreamPosition::new(0, Some(500));
        pos.apply_response_length(None);
        assert_eq!(pos.total_bytes_expected, Some(500));
    }

    #[test]
    fn playable_range_prefers_demux_values() {
        let mut pos = StreamPosition::new(0, Some(10_000));
        assert_eq!(pos.playable_range(), Some(0..10_000));
        pos.audio_data_start_offset = Some(44);
        assert_eq!(pos.playable_range(), Some(44..10_000));
        pos.audio_data_byte_count = Some(8000);
        assert_eq!(pos.playable_range(), Some(44..8044));
    }

    #[test]
    fn progress_counts_seek_offset() {
        let mut pos = StreamPosition::new(500, Some(1000));
        pos.record_bytes(250);
        assert_eq!(pos.file_offset(), 750);
        assert_eq!(pos.progress(), Some(0.75));
        assert_eq!(StreamPosition::default().progress(), None);
    }
}
