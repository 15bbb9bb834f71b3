use std::{
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use brook_net::{FeedRequest, HttpClient, HttpFeed, NetError};
use tokio::{
    runtime::Handle,
    sync::{broadcast, watch},
};
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::PlayerConfig,
    demux::DemuxerFactory,
    driver::{self, Core, DriverParts, Shared},
    engine::EngineFactory,
    error::{QueueError, QueueResult},
    events::Event,
    format::{AudioFormat, ContainerFormat},
    state::{EngineCommand, PlayerState, StartRequest},
    types::{QueueStats, StreamPosition},
};

/// Control surface of one streaming playback.
///
/// A player plays one URL once: `start` spawns the driver thread, `stop`
/// (or drop) tears everything down and the player ends in
/// [`PlayerState::Stopped`].
pub struct Player {
    shared: Arc<Shared>,
    config: PlayerConfig,
    parts: Option<(Box<dyn brook_net::Feed>, Box<dyn DemuxerFactory>)>,
    driver: Option<JoinHandle<()>>,
}

impl Player {
    /// # Errors
    ///
    /// [`QueueError::InvalidConfig`] if the queue configuration is unusable.
    pub fn new(
        config: PlayerConfig,
        feed: Box<dyn brook_net::Feed>,
        demuxers: Box<dyn DemuxerFactory>,
        engines: Box<dyn EngineFactory>,
    ) -> QueueResult<Self> {
        config.queue.validate()?;
        let position = StreamPosition::new(config.seek_byte_offset, config.file_length);
        let shared = Shared::new(&config.queue, position, engines);
        Ok(Self {
            shared,
            config,
            parts: Some((feed, demuxers)),
            driver: None,
        })
    }

    /// Player fetching over HTTP on `config.runtime`, or on the current tokio
    /// runtime when none is set.
    ///
    /// # Errors
    ///
    /// [`QueueError::ConnectionFailed`] if the HTTP client cannot be built or
    /// no runtime is available.
    pub fn with_http(
        config: PlayerConfig,
        demuxers: Box<dyn DemuxerFactory>,
        engines: Box<dyn EngineFactory>,
    ) -> QueueResult<Self> {
        let client = HttpClient::new(config.net.clone())?;
        let runtime = match config.runtime.clone() {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| NetError::NoRuntime)?,
        };
        let feed = HttpFeed::new(client, runtime);
        Self::new(config, Box::new(feed), demuxers, engines)
    }

    /// Begin streaming `url`. While paused this is a resume and `url` is
    /// ignored.
    ///
    /// # Errors
    ///
    /// [`QueueError::Spawn`] if the driver thread cannot be started, or the
    /// engine's failure when resuming.
    pub fn start(&mut self, url: Url) -> QueueResult<()> {
        let request = self.shared.core.lock().transition(|m| m.request_start());
        match request {
            StartRequest::SpawnDriver => self.spawn_driver(url),
            StartRequest::Resume => {
                let result = restart(&mut self.shared.core.lock(), Some(EngineCommand::Start));
                self.settle(result)
            }
            StartRequest::Ignored => {
                warn!(state = ?self.state(), "start ignored");
                Ok(())
            }
        }
    }

    fn spawn_driver(&mut self, url: Url) -> QueueResult<()> {
        let Some((feed, demuxers)) = self.parts.take() else {
            return Err(QueueError::InvalidConfig("player already started".into()));
        };
        let hint = self
            .config
            .format_hint
            .or_else(|| ContainerFormat::from_url(&url));
        let request = FeedRequest::new(url)
            .with_start_offset(self.config.seek_byte_offset)
            .with_total_length(self.config.file_length);
        let parts = DriverParts {
            feed,
            demuxers,
            request,
            hint,
        };

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("brook-driver".to_string())
            .spawn(move || driver::run(&shared, parts));
        match spawned {
            Ok(handle) => {
                debug!("driver thread spawned");
                self.driver = Some(handle);
                Ok(())
            }
            Err(e) => {
                let err = QueueError::Spawn(e.to_string());
                let mut core = self.shared.core.lock();
                core.fail(err.clone());
                core.request_stop();
                drop(core);
                self.shared.cond.notify_all();
                Err(err)
            }
        }
    }

    /// Freeze the engine. Network and buffers are left alone.
    ///
    /// # Errors
    ///
    /// The engine's failure; the player is then stopping.
    pub fn pause(&self) -> QueueResult<()> {
        let mut core = self.shared.core.lock();
        let command = core.transition(|m| m.pause());
        let result = core.run_command(command);
        drop(core);
        self.settle(result)
    }

    /// # Errors
    ///
    /// The engine's failure; the player is then stopping.
    pub fn resume(&self) -> QueueResult<()> {
        let mut core = self.shared.core.lock();
        let command = core.transition(|m| m.resume());
        let result = restart(&mut core, command);
        drop(core);
        self.settle(result)
    }

    fn settle(&self, result: QueueResult<()>) -> QueueResult<()> {
        if let Err(e) = &result {
            self.shared.core.lock().fail(e.clone());
        }
        self.shared.cond.notify_all();
        result
    }

    /// Stop playback now, dropping whatever is buffered.
    pub fn stop(&self) {
        self.shared.core.lock().request_stop();
        self.shared.cond.notify_all();
    }

    pub fn state(&self) -> PlayerState {
        self.shared.core.lock().state()
    }

    /// Async view of the state, for callers living on a runtime.
    pub fn watch_state(&self) -> watch::Receiver<PlayerState> {
        self.shared.state_rx.clone()
    }

    pub fn position(&self) -> StreamPosition {
        self.shared.core.lock().position.clone()
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.core.lock().scheduler.stats()
    }

    /// The error that stopped playback, if any.
    pub fn failure(&self) -> Option<QueueError> {
        self.shared.core.lock().failure.clone()
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.shared.core.lock().bridge.format()
    }

    /// Buffers currently held by the output engine.
    pub fn in_flight(&self) -> usize {
        self.shared.core.lock().scheduler.in_flight()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Block until `pred` holds for the state or `timeout` passes.
    pub fn wait_for(&self, pred: impl Fn(PlayerState) -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut core = self.shared.core.lock();
        while !pred(core.state()) {
            if self.shared.cond.wait_until(&mut core, deadline).timed_out() {
                return pred(core.state());
            }
        }
        true
    }

    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        self.wait_for(PlayerState::is_terminal, timeout)
    }

    /// Wait for the driver thread to exit.
    pub fn join(&mut self) {
        if let Some(handle) = self.driver.take()
            && handle.join().is_err()
        {
            warn!("driver thread panicked");
        }
    }
}

/// Restart a paused engine and, if the stream already ended, let it play out.
fn restart(core: &mut Core, command: Option<EngineCommand>) -> QueueResult<()> {
    core.run_command(command)?;
    let drain = core.machine.take_drain();
    core.run_command(drain)
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "player_tests.rs"]
mod tests;
