//! Example: stream headerless PCM over HTTP into a simulated output device.
//!
//! The "device" renders each buffer by sleeping for its playback duration,
//! so the network is throttled by the buffer pool exactly as it would be by a
//! real sound card.
//!
//! Run with:
//! ```
//! cargo run -p brook-tests --bin pcm_fixture_server &
//! cargo run -p brook --example stream_pcm [URL]
//! ```

use std::{
    env::args,
    error::Error,
    thread,
    time::{Duration, Instant},
};

use brook::{
    prelude::*,
    queue::{BufferId, EngineError, RawDemuxerFactory},
};
use tracing::{info, metadata::LevelFilter, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

enum Render {
    Buffer(AudioBuffer),
    Start,
    Pause,
    Stop { immediate: bool },
}

/// Engine whose render thread paces buffers in real time.
struct ClockEngine {
    tx: kanal::Sender<Render>,
}

impl ClockEngine {
    fn spawn(format: &AudioFormat, notifier: EngineNotifier) -> Result<Self, EngineError> {
        let bytes_per_second =
            u64::from(format.sample_rate) * u64::from(format.bytes_per_frame.max(1));
        let (tx, rx) = kanal::unbounded();
        thread::Builder::new()
            .name("clock-engine".to_string())
            .spawn(move || render(&rx, &notifier, bytes_per_second))
            .map_err(|e| EngineError::Operation(e.to_string()))?;
        Ok(Self { tx })
    }

    fn send(&self, msg: Render) -> Result<(), EngineError> {
        self.tx.send(msg).map_err(|_| EngineError::Closed)
    }
}

impl OutputEngine for ClockEngine {
    fn allocate_buffer(&mut self, id: BufferId, capacity: usize) -> Result<(), EngineError> {
        info!(buffer = %id, capacity, "device buffer allocated");
        Ok(())
    }

    fn set_codec_config(&mut self, _config: &[u8]) -> Result<(), EngineError> {
        Ok(())
    }

    fn enqueue(&mut self, buffer: AudioBuffer) -> Result<(), EngineError> {
        self.send(Render::Buffer(buffer))
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.send(Render::Start)
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.send(Render::Pause)
    }

    fn stop(&mut self, immediate: bool) -> Result<(), EngineError> {
        self.send(Render::Stop { immediate })
    }
}

fn render(rx: &kanal::Receiver<Render>, notifier: &EngineNotifier, bytes_per_second: u64) {
    let mut queue = std::collections::VecDeque::new();
    let mut playing = false;
    let mut draining = false;
    loop {
        let idle = !playing || queue.is_empty();
        let msg = if idle {
            rx.recv().ok()
        } else {
            rx.try_recv().ok().flatten()
        };
        match msg {
            Some(Render::Buffer(buffer)) => queue.push_back(buffer),
            Some(Render::Start) if !playing => {
                playing = true;
                notifier.running_changed(true);
            }
            Some(Render::Start) => {}
            Some(Render::Pause) => playing = false,
            Some(Render::Stop { immediate: true }) => {
                notifier.running_changed(false);
                return;
            }
            Some(Render::Stop { immediate: false }) => draining = true,
            None if idle => return,
            None => {}
        }
        if !playing {
            continue;
        }
        if let Some(buffer) = queue.pop_front() {
            let started = Instant::now();
            let nanos = buffer.used() as u64 * 1_000_000_000 / bytes_per_second.max(1);
            thread::sleep(Duration::from_nanos(nanos).saturating_sub(started.elapsed()));
            notifier.buffer_consumed(buffer);
        } else if draining {
            playing = false;
            notifier.running_changed(false);
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::default()
                .add_directive("brook=info".parse()?)
                .add_directive("brook_queue=debug".parse()?)
                .add_directive("brook_net=info".parse()?)
                .add_directive(LevelFilter::WARN.into()),
        )
        .with_line_number(false)
        .with_file(false)
        .init();

    let url = args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:3333/track.pcm".to_string());
    let url = Url::parse(&url)?;
    info!(%url, "opening");

    let format = AudioFormat::pcm(44_100, 2, 16);
    let engines = |format: &AudioFormat, notifier: EngineNotifier| {
        ClockEngine::spawn(format, notifier).map(|e| Box::new(e) as Box<dyn OutputEngine>)
    };
    let config = PlayerConfig::default()
        .with_format_hint(ContainerFormat::RawPcm)
        .with_queue(QueueConfig::default().with_default_buffer_size(16 * 1024));
    let mut player = Player::with_http(
        config,
        Box::new(RawDemuxerFactory::new(format)),
        Box::new(engines),
    )?;

    let mut events = player.subscribe();
    tokio::spawn(async move {
        while let Ok(ev) = events.recv().await {
            if let Event::Player(PlayerEvent::StateChanged { from, to }) = ev {
                info!(?from, ?to, "state");
            }
        }
    });

    player.start(url)?;

    let finished = tokio::task::spawn_blocking(move || {
        let done = player.wait_until_stopped(Duration::from_secs(3600));
        (done, player.failure(), player.stats())
    })
    .await?;

    match finished {
        (true, None, stats) => info!(?stats, "playback complete"),
        (true, Some(err), stats) => warn!(error = %err, ?stats, "playback failed"),
        (false, _, _) => warn!("gave up waiting for playback to finish"),
    }
    Ok(())
}
