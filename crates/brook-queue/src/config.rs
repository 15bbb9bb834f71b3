use std::time::Duration;

use brook_net::NetOptions;
use derivative::Derivative;
use derive_setters::Setters;
use tokio::runtime::Handle;

use crate::{
    error::{QueueError, QueueResult},
    format::ContainerFormat,
};

/// Buffer pool and driver tuning.
#[derive(Clone, Debug, Derivative, Setters)]
#[derivative(Default)]
#[setters(prefix = "with_", strip_option)]
pub struct QueueConfig {
    /// Number of buffers in the pool (N). Default: 3.
    #[derivative(Default(value = "3"))]
    pub buffer_count: usize,
    /// Packet descriptors per buffer (M). Default: 512.
    #[derivative(Default(value = "512"))]
    pub max_packets_per_buffer: usize,
    /// Buffer size when the stream states no packet bound. Default: 2048.
    #[derivative(Default(value = "2048"))]
    pub default_buffer_size: usize,
    /// Enqueued buffers needed to start the engine. `None` means N-1.
    pub startup_threshold: Option<usize>,
    /// Granularity of the driver's wait loop. Default: 250 ms.
    #[derivative(Default(value = "Duration::from_millis(250)"))]
    pub poll_interval: Duration,
    /// Event bus capacity. Default: 64.
    #[derivative(Default(value = "64"))]
    pub event_capacity: usize,
}

impl QueueConfig {
    /// # Errors
    ///
    /// [`QueueError::InvalidConfig`] describing the first bad field.
    pub fn validate(&self) -> QueueResult<()> {
        if self.buffer_count < 2 {
            return Err(QueueError::InvalidConfig(format!(
                "buffer_count must be at least 2, got {}",
                self.buffer_count
            )));
        }
        if self.max_packets_per_buffer == 0 {
            return Err(QueueError::InvalidConfig(
                "max_packets_per_buffer must be non-zero".into(),
            ));
        }
        if self.default_buffer_size == 0 {
            return Err(QueueError::InvalidConfig(
                "default_buffer_size must be non-zero".into(),
            ));
        }
        if let Some(t) = self.startup_threshold.filter(|&t| t == 0 || t >= self.buffer_count) {
            return Err(QueueError::InvalidConfig(format!(
                "startup_threshold must be in 1..{}, got {t}",
                self.buffer_count
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(QueueError::InvalidConfig("poll_interval must be non-zero".into()));
        }
        Ok(())
    }

    /// Effective startup threshold.
    pub fn threshold(&self) -> usize {
        self.startup_threshold
            .unwrap_or_else(|| self.buffer_count.saturating_sub(1))
            .max(1)
    }
}

/// Everything a [`Player`](crate::Player) needs besides its collaborators.
#[derive(Clone, Debug, Default, Setters)]
#[setters(prefix = "with_", strip_option)]
pub struct PlayerConfig {
    pub queue: QueueConfig,
    /// Used by [`Player::with_http`](crate::Player::with_http).
    pub net: NetOptions,
    /// Container hint for the demuxer. Derived from the URL when `None`.
    pub format_hint: Option<ContainerFormat>,
    /// Resume offset into the file.
    pub seek_byte_offset: u64,
    /// Total file length, if known from an earlier request.
    pub file_length: Option<u64>,
    /// Runtime for the HTTP feed. Defaults to the caller's runtime.
    pub runtime: Option<Handle>,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults() {
        let c = QueueConfig::default();
        assert_eq!(c.buffer_count, 3);
        assert_eq!(c.max_packets_per_buffer, 512);
        assert_eq!(c.default_buffer_size, 2048);
        assert_eq!(c.poll_interval, Duration::from_millis(250));
        assert_eq!(c.threshold(), 2);
        assert!(c.validate().is_ok());
    }

    #[rstest]
    #[case(QueueConfig::default().with_buffer_count(1))]
    #[case(QueueConfig::default().with_max_packets_per_buffer(0))]
    #[case(QueueConfig::default().with_default_buffer_size(0))]
    #[case(QueueConfig::default().with_startup_threshold(0))]
    #[case(QueueConfig::default().with_startup_threshold(3))]
    #[case(QueueConfig::default().with_poll_interval(Duration::ZERO))]
    fn invalid_configs_are_rejected(#[case] config: QueueConfig) {
        assert!(matches!(config.validate(), Err(QueueError::InvalidConfig(_))));
    }

    #[rstest]
    #[case(2, None, 1)]
    #[case(5, None, 4)]
    #[case(5, Some(2), 2)]
    fn threshold_defaults_to_all_but_one(
        #[case] n: usize,
        #[case] explicit: Option<usize>,
        #[case] expected: usize,
    ) {
        let mut c = QueueConfig::default().with_buffer_count(n);
        c.startup_threshold = explicit;
        assert!(c.validate().is_ok());
        assert_eq!(c.threshold(), expected);
    }

    #[test]
    fn player_config_setters() {
        let c = PlayerConfig::default()
            .with_seek_byte_offset(100)
            .with_file_length(1000)
            .with_format_hint(ContainerFormat::MpegAudio);
        assert_eq!(c.seek_byte_offset, 100);
        assert_eq!(c.file_length, Some(1000));
        assert_eq!(c.format_hint, Some(ContainerFormat::MpegAudio));
    }
}
