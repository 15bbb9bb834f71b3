//! Container and stream format descriptors.
//!
//! The container hint is handed to the demuxer when it is opened; the
//! [`AudioFormat`] is what the demuxer reports back once it has parsed enough
//! of the stream, and what the output engine is constructed with.

use url::Url;

/// Container format of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ContainerFormat {
    /// MPEG audio elementary stream (MP3)
    MpegAudio,
    /// AAC with ADTS framing
    Adts,
    /// MPEG-4 / M4A
    Mp4,
    /// Native FLAC stream
    Flac,
    /// RIFF WAVE
    Wav,
    /// AIFF / AIFC
    Aiff,
    /// Ogg container
    Ogg,
    /// Core Audio Format
    Caf,
    /// Headerless linear PCM
    RawPcm,
}

impl ContainerFormat {
    /// Guess the container from a file extension (case-insensitive, no dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "mp3" | "mpga" => Some(Self::MpegAudio),
            "aac" | "adts" => Some(Self::Adts),
            "m4a" | "mp4" | "m4b" => Some(Self::Mp4),
            "flac" => Some(Self::Flac),
            "wav" | "wave" => Some(Self::Wav),
            "aif" | "aiff" | "aifc" => Some(Self::Aiff),
            "ogg" | "oga" | "opus" => Some(Self::Ogg),
            "caf" => Some(Self::Caf),
            "pcm" | "raw" => Some(Self::RawPcm),
            _ => None,
        }
    }

    /// Guess the container from the last path segment of a URL.
    pub fn from_url(url: &Url) -> Option<Self> {
        let segment = url.path_segments()?.next_back()?;
        let (_, ext) = segment.rsplit_once('.')?;
        Self::from_extension(ext)
    }
}

/// Audio codec type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AudioCodec {
    /// AAC Low Complexity
    AacLc,
    /// AAC High Efficiency (SBR)
    AacHe,
    /// AAC HE v2 (SBR + PS)
    AacHeV2,
    Mp3,
    Flac,
    Vorbis,
    Opus,
    /// Apple Lossless
    Alac,
    /// Linear PCM
    Pcm,
    Adpcm,
}

impl AudioCodec {
    pub fn is_high_efficiency(self) -> bool {
        matches!(self, Self::AacHe | Self::AacHeV2)
    }
}

/// Stream description discovered by the demuxer.
///
/// A zero in `bytes_per_packet` or `frames_per_packet` means the value varies
/// per packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: AudioCodec,
    pub bytes_per_packet: u32,
    pub frames_per_packet: u32,
    pub bytes_per_frame: u32,
    pub bits_per_channel: u32,
}

impl AudioFormat {
    pub fn new(codec: AudioCodec, sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            codec,
            bytes_per_packet: 0,
            frames_per_packet: 0,
            bytes_per_frame: 0,
            bits_per_channel: 0,
        }
    }

    /// Interleaved linear PCM with one frame per packet.
    pub fn pcm(sample_rate: u32, channels: u16, bits_per_channel: u32) -> Self {
        let bytes_per_frame = u32::from(channels) * bits_per_channel.div_ceil(8);
        Self {
            sample_rate,
            channels,
            codec: AudioCodec::Pcm,
            bytes_per_packet: bytes_per_frame,
            frames_per_packet: 1,
            bytes_per_frame,
            bits_per_channel,
        }
    }

    #[must_use]
    pub fn with_packet_layout(mut self, bytes_per_packet: u32, frames_per_packet: u32) -> Self {
        self.bytes_per_packet = bytes_per_packet;
        self.frames_per_packet = frames_per_packet;
        self
    }

    /// Variable bitrate: packets differ in size.
    pub fn is_vbr(&self) -> bool {
        self.bytes_per_packet == 0
    }

    pub fn is_high_efficiency(&self) -> bool {
        self.codec.is_high_efficiency()
    }
}
