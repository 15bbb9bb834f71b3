//! Owns the output engine: lazy construction, codec config, hand-off and
//! control commands.

use tracing::{debug, info, warn};

use crate::{
    buffer::AudioBuffer,
    config::QueueConfig,
    demux::StreamProperties,
    engine::{EngineFactory, EngineNotifier, OutputEngine},
    error::{DemuxError, QueueError, QueueResult},
    format::AudioFormat,
    pool::BufferPool,
    state::EngineCommand,
    types::BufferId,
};

/// Buffer size from the format's packet upper bound, then the demuxer's
/// maximum packet size, then `default`. Zero means unknown.
pub fn resolve_buffer_size(upper_bound: Option<u32>, maximum: Option<u32>, default: usize) -> usize {
    upper_bound
        .filter(|&b| b > 0)
        .or(maximum.filter(|&m| m > 0))
        .map_or(default, |b| b as usize)
}

pub struct EngineBridge {
    factory: Box<dyn EngineFactory>,
    engine: Option<Box<dyn OutputEngine>>,
    format: Option<AudioFormat>,
    format_upgraded: bool,
    codec_config_sent: bool,
    running: bool,
    buffer_count: usize,
    max_packets: usize,
    default_buffer_size: usize,
}

impl EngineBridge {
    pub fn new(factory: Box<dyn EngineFactory>, config: &QueueConfig) -> Self {
        Self {
            factory,
            engine: None,
            format: None,
            format_upgraded: false,
            codec_config_sent: false,
            running: false,
            buffer_count: config.buffer_count,
            max_packets: config.max_packets_per_buffer,
            default_buffer_size: config.default_buffer_size,
        }
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    pub fn is_constructed(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Record the discovered format. Only the first report counts.
    pub fn set_format(&mut self, format: AudioFormat) -> bool {
        if self.format.is_some() {
            return false;
        }
        debug!(?format, "format detected");
        self.format = Some(format);
        true
    }

    /// Replace the format with a high-efficiency entry from `list`, once, and
    /// only while the engine does not exist yet.
    pub fn offer_formats(&mut self, list: &[AudioFormat]) -> Option<AudioFormat> {
        if self.format_upgraded || self.engine.is_some() {
            return None;
        }
        let better = *list.iter().find(|f| f.is_high_efficiency())?;
        if self.format == Some(better) {
            return None;
        }
        info!(from = ?self.format, to = ?better, "upgrading to high-efficiency format");
        self.format = Some(better);
        self.format_upgraded = true;
        Some(better)
    }

    /// Build the engine and its buffers on first call. Returns the new pool,
    /// or `None` if the engine already exists.
    ///
    /// # Errors
    ///
    /// [`QueueError::ParseFailed`] if no format is known yet,
    /// [`QueueError::EngineCreateFailed`] if the engine refuses.
    pub fn ensure_engine_constructed(
        &mut self,
        props: &dyn StreamProperties,
        notifier: EngineNotifier,
    ) -> QueueResult<Option<BufferPool>> {
        if self.engine.is_some() {
            return Ok(None);
        }
        if self.format.is_none() {
            if let Some(format) = props.data_format()? {
                self.set_format(format);
            }
        }
        let Some(format) = self.format else {
            return Err(QueueError::ParseFailed(DemuxError::Property(
                "packets arrived before the data format".into(),
            )));
        };

        let capacity = resolve_buffer_size(
            props.packet_size_upper_bound(),
            props.maximum_packet_size(),
            self.default_buffer_size,
        );
        let mut engine = self
            .factory
            .create(&format, notifier)
            .map_err(QueueError::EngineCreateFailed)?;
        for i in 0..self.buffer_count {
            engine
                .allocate_buffer(BufferId::new(i), capacity)
                .map_err(QueueError::EngineCreateFailed)?;
        }
        info!(
            buffers = self.buffer_count,
            capacity,
            codec = ?format.codec,
            "output engine constructed"
        );
        self.engine = Some(engine);
        Ok(Some(BufferPool::new(
            self.buffer_count,
            capacity,
            self.max_packets,
        )))
    }

    /// Forward the codec configuration, once. Failures are logged and ignored.
    pub fn propagate_codec_config(&mut self, props: &dyn StreamProperties) {
        if self.codec_config_sent {
            return;
        }
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        self.codec_config_sent = true;
        match props.codec_config() {
            Ok(Some(blob)) => {
                if let Err(e) = engine.set_codec_config(&blob) {
                    warn!(error = %e, "engine rejected codec config, continuing without it");
                } else {
                    debug!(len = blob.len(), "codec config propagated");
                }
            }
            Ok(None) => debug!("stream has no codec config"),
            Err(e) => warn!(error = %e, "codec config unavailable, continuing without it"),
        }
    }

    /// # Errors
    ///
    /// [`QueueError::EngineNotReady`] before construction, or the engine's
    /// own failure.
    pub fn enqueue(&mut self, buffer: AudioBuffer) -> QueueResult<()> {
        let engine = self.engine.as_mut().ok_or(QueueError::EngineNotReady)?;
        engine.enqueue(buffer).map_err(QueueError::Engine)
    }

    /// # Errors
    ///
    /// [`QueueError::EngineNotReady`] before construction, or the engine's
    /// own failure.
    pub fn execute(&mut self, command: EngineCommand) -> QueueResult<()> {
        let engine = self.engine.as_mut().ok_or(QueueError::EngineNotReady)?;
        debug!(?command, "engine command");
        let result = match command {
            EngineCommand::Start => engine.start(),
            EngineCommand::Pause => engine.pause(),
            EngineCommand::DrainAndStop => engine.stop(false),
            EngineCommand::StopNow => engine.stop(true),
        };
        result.map_err(QueueError::Engine)
    }

    /// Stop and drop the engine. Safe to call more than once.
    pub fn teardown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.stop(true) {
                debug!(error = %e, "engine stop during teardown failed");
            }
            debug!("output engine torn down");
        }
        self.running = false;
    }
}

impl std::fmt::Debug for EngineBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBridge")
            .field("constructed", &self.engine.is_some())
            .field("format", &self.format)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}
