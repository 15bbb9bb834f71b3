//! Demultiplexer contract plus a passthrough implementation for raw PCM.

use bytes::Bytes;
use derive_setters::Setters;

use crate::{
    error::{DemuxError, QueueResult},
    format::{AudioFormat, ContainerFormat},
    types::PacketDescriptor,
};

/// Which stream property just became available.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PropertyKind {
    ReadyToProducePackets,
    DataOffset,
    AudioDataByteCount,
    DataFormat,
    /// Alternative encodings of the same stream, richest first.
    FormatList,
}

/// Read access to what the demuxer has parsed so far.
pub trait StreamProperties {
    fn data_offset(&self) -> Result<Option<u64>, DemuxError>;

    fn audio_data_byte_count(&self) -> Result<Option<u64>, DemuxError>;

    fn data_format(&self) -> Result<Option<AudioFormat>, DemuxError>;

    fn format_list(&self) -> Result<Vec<AudioFormat>, DemuxError>;

    /// Largest packet the format can produce, if the container states it.
    fn packet_size_upper_bound(&self) -> Option<u32>;

    /// Largest packet seen or declared by the demuxer.
    fn maximum_packet_size(&self) -> Option<u32>;

    fn codec_config(&self) -> Result<Option<Bytes>, DemuxError>;
}

/// Receiver of demuxer output, called synchronously from [`Demuxer::feed`].
pub trait DemuxSink {
    fn on_property(&mut self, kind: PropertyKind, props: &dyn StreamProperties) -> QueueResult<()>;

    /// `packets` index into `bytes`. `None` means `bytes` is undemuxed audio.
    fn on_packets(
        &mut self,
        packets: Option<&[PacketDescriptor]>,
        bytes: &[u8],
        props: &dyn StreamProperties,
    ) -> QueueResult<()>;
}

pub trait Demuxer: Send {
    /// Consume the next chunk. Chunks have arbitrary boundaries; the demuxer
    /// keeps whatever partial packet it needs.
    ///
    /// # Errors
    ///
    /// [`QueueError::ParseFailed`](crate::QueueError::ParseFailed) if the bytes
    /// are rejected, or whatever the sink returned.
    fn feed(&mut self, bytes: &[u8], sink: &mut dyn DemuxSink) -> QueueResult<()>;
}

pub trait DemuxerFactory: Send {
    fn open(&mut self, hint: Option<ContainerFormat>) -> Result<Box<dyn Demuxer>, DemuxError>;
}

/// Plain [`StreamProperties`] value.
#[derive(Clone, Debug, Default, PartialEq, Setters)]
#[setters(prefix = "with_", strip_option)]
pub struct PropertySnapshot {
    pub data_offset: Option<u64>,
    pub audio_data_byte_count: Option<u64>,
    pub data_format: Option<AudioFormat>,
    pub format_list: Vec<AudioFormat>,
    pub packet_size_upper_bound: Option<u32>,
    pub maximum_packet_size: Option<u32>,
    pub codec_config: Option<Bytes>,
}

impl StreamProperties for PropertySnapshot {
    fn data_offset(&self) -> Result<Option<u64>, DemuxError> {
        Ok(self.data_offset)
    }

    fn audio_data_byte_count(&self) -> Result<Option<u64>, DemuxError> {
        Ok(self.audio_data_byte_count)
    }

    fn data_format(&self) -> Result<Option<AudioFormat>, DemuxError> {
        Ok(self.data_format)
    }

    fn format_list(&self) -> Result<Vec<AudioFormat>, DemuxError> {
        Ok(self.format_list.clone())
    }

    fn packet_size_upper_bound(&self) -> Option<u32> {
        self.packet_size_upper_bound
    }

    fn maximum_packet_size(&self) -> Option<u32> {
        self.maximum_packet_size
    }

    fn codec_config(&self) -> Result<Option<Bytes>, DemuxError> {
        Ok(self.codec_config.clone())
    }
}

/// Passthrough for headerless PCM: reports a fixed format, then hands every
/// chunk on as undemuxed bytes.
pub struct RawDemuxer {
    props: PropertySnapshot,
    announced: bool,
}

impl RawDemuxer {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            props: PropertySnapshot::default()
                .with_data_offset(0)
                .with_data_format(format),
            announced: false,
        }
    }
}

impl Demuxer for RawDemuxer {
    fn feed(&mut self, bytes: &[u8], sink: &mut dyn DemuxSink) -> QueueResult<()> {
        if !self.announced {
            self.announced = true;
            for kind in [
                PropertyKind::DataFormat,
                PropertyKind::DataOffset,
                PropertyKind::ReadyToProducePackets,
            ] {
                sink.on_property(kind, &self.props)?;
            }
        }
        if bytes.is_empty() {
            return Ok(());
        }
        sink.on_packets(None, bytes, &self.props)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RawDemuxerFactory {
    format: AudioFormat,
}

impl RawDemuxerFactory {
    pub fn new(format: AudioFormat) -> Self {
        Self { format }
    }
}

impl DemuxerFactory for RawDemuxerFactory {
    fn open(&mut self, hint: Option<ContainerFormat>) -> Result<Box<dyn Demuxer>, DemuxError> {
        match hint {
            None | Some(ContainerFormat::RawPcm) => Ok(Box::new(RawDemuxer::new(self.format))),
            Some(other) => Err(DemuxError::Unsupported(format!("{other:?}"))),
        }
    }
}
