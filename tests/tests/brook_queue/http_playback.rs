use std::time::Duration;

use brook::queue::{
    AudioCodec, AudioFormat, DemuxerFactory, Player, PlayerConfig, PlayerState, PropertySnapshot,
    QueueConfig, QueueError, QueueStats, RawDemuxerFactory, StreamPosition,
    mock::{EnqueuedBuffer, MockEngineFactory, ScriptedDemuxerFactory},
};
use brook_test_utils::{AudioServer, pattern, pcm_tone};
use rstest::*;
use url::Url;

use crate::common::STEP;

struct Outcome {
    stopped: bool,
    failure: Option<QueueError>,
    enqueued: Vec<EnqueuedBuffer>,
    position: StreamPosition,
    stats: QueueStats,
}

impl Outcome {
    fn audio(&self) -> Vec<u8> {
        self.enqueued
            .iter()
            .flat_map(|e| e.bytes.iter().copied())
            .collect()
    }
}

fn mp3_packets(packet: usize) -> ScriptedDemuxerFactory {
    let props = PropertySnapshot::default()
        .with_data_format(AudioFormat::new(AudioCodec::Mp3, 44_100, 2))
        .with_packet_size_upper_bound(1_024);
    ScriptedDemuxerFactory::fixed(props, packet)
}

fn config() -> PlayerConfig {
    PlayerConfig::default().with_queue(
        QueueConfig::default()
            .with_buffer_count(4)
            .with_poll_interval(Duration::from_millis(10)),
    )
}

/// Play `url` to the end with a renderer consuming one buffer per tick.
async fn play(
    config: PlayerConfig,
    demuxers: impl DemuxerFactory + 'static,
    url: Url,
    stop_after: Option<Duration>,
) -> Outcome {
    let engines = MockEngineFactory::new();
    let engine = engines.handle();
    let mut player = Player::with_http(config, Box::new(demuxers), Box::new(engines)).unwrap();

    tokio::task::spawn_blocking(move || {
        let _renderer = engine.spawn_renderer(Duration::from_millis(1));
        player.start(url).unwrap();
        if let Some(after) = stop_after {
            std::thread::sleep(after);
            player.stop();
        }
        let stopped = player.wait_until_stopped(STEP * 2);
        player.join();
        Outcome {
            stopped,
            failure: player.failure(),
            enqueued: engine.enqueued(),
            position: player.position(),
            stats: player.stats(),
        }
    })
    .await
    .unwrap()
}

#[fixture]
async fn server() -> AudioServer {
    AudioServer::new(pattern(64 * 1024)).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
#[timeout(Duration::from_secs(20))]
async fn plays_whole_stream_in_order(#[future] server: AudioServer) {
    let server = server.await;
    let out = play(config(), mp3_packets(417), server.url("/track.mp3"), None).await;

    assert!(out.stopped);
    assert_eq!(out.failure, None);
    let whole = out.audio();
    // Only complete packets reach the engine.
    let usable = server.payload.len() / 417 * 417;
    assert_eq!(whole, server.payload[..usable].to_vec());
    assert!(out.enqueued.iter().all(|e| e.bytes.len() <= 1_024));
    assert_eq!(out.position.bytes_received, server.payload.len() as u64);
    assert_eq!(out.stats.consumed, out.stats.enqueued);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
#[timeout(Duration::from_secs(20))]
async fn resumes_from_byte_offset(#[future] server: AudioServer) {
    let server = server.await;
    let config = config()
        .with_seek_byte_offset(40_000)
        .with_file_length(server.payload.len() as u64);
    let out = play(config, mp3_packets(100), server.url("/track.mp3"), None).await;

    assert!(out.stopped);
    assert_eq!(out.failure, None);
    let tail = &server.payload[40_000..];
    let usable = tail.len() / 100 * 100;
    assert_eq!(out.audio(), tail[..usable].to_vec());
    assert_eq!(
        out.position.total_bytes_expected,
        Some(server.payload.len() as u64)
    );
    assert_eq!(out.position.file_offset(), server.payload.len() as u64);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
#[timeout(Duration::from_secs(20))]
async fn resume_is_refused_when_server_ignores_range(#[future] server: AudioServer) {
    let server = server.await;
    let config = config()
        .with_seek_byte_offset(40_000)
        .with_file_length(server.payload.len() as u64);
    let out = play(config, mp3_packets(100), server.url("/no-range.mp3"), None).await;

    assert!(out.stopped);
    match out.failure {
        Some(QueueError::ConnectionFailed(err)) => assert_eq!(err.status_code(), Some(200)),
        other => panic!("unexpected failure: {other:?}"),
    }
    assert!(out.enqueued.is_empty());
    assert_eq!(out.position.bytes_received, 0);
    assert_eq!(
        out.position.total_bytes_expected,
        Some(server.payload.len() as u64)
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
#[timeout(Duration::from_secs(20))]
async fn missing_resource_fails_to_connect(#[future] server: AudioServer) {
    let server = server.await;
    let out = play(config(), mp3_packets(100), server.url("/missing.mp3"), None).await;

    assert!(out.stopped);
    match out.failure {
        Some(QueueError::ConnectionFailed(err)) => assert_eq!(err.status_code(), Some(404)),
        other => panic!("unexpected failure: {other:?}"),
    }
    assert!(out.enqueued.is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
#[timeout(Duration::from_secs(20))]
async fn broken_connection_keeps_what_was_delivered(#[future] server: AudioServer) {
    let server = server.await;
    let out = play(config(), mp3_packets(256), server.url("/truncated.mp3"), None).await;

    assert!(out.stopped);
    assert!(matches!(out.failure, Some(QueueError::ConnectionFailed(_))));
    let audio = out.audio();
    assert!(audio.len() < server.payload.len());
    assert_eq!(audio, server.payload[..audio.len()].to_vec());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
#[timeout(Duration::from_secs(20))]
async fn stop_mid_stream_is_clean(#[future] server: AudioServer) {
    let server = server.await;
    let out = play(
        config(),
        mp3_packets(512),
        server.url("/slow.mp3"),
        Some(Duration::from_millis(60)),
    )
    .await;

    assert!(out.stopped);
    assert_eq!(out.failure, None);
    assert!(out.position.bytes_received < server.payload.len() as u64);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
#[timeout(Duration::from_secs(20))]
async fn raw_pcm_is_played_verbatim() {
    let tone = pcm_tone(20_000, 2);
    let server = AudioServer::new(tone.clone()).await;
    let config = config().with_queue(
        QueueConfig::default()
            .with_default_buffer_size(4_096)
            .with_poll_interval(Duration::from_millis(10)),
    );
    let demuxers = RawDemuxerFactory::new(AudioFormat::pcm(44_100, 2, 16));
    let out = play(config, demuxers, server.url("/track.pcm"), None).await;

    assert!(out.stopped);
    assert_eq!(out.failure, None);
    assert_eq!(out.audio(), tone);
    assert_eq!(out.enqueued.len(), tone.len().div_ceil(4_096));
}

#[test]
fn fresh_player_reports_initialized() {
    let player = Player::new(
        config(),
        Box::new(brook::queue::mock::ScriptedFeed::new(Vec::new())),
        Box::new(mp3_packets(100)),
        Box::new(MockEngineFactory::new()),
    )
    .unwrap();
    assert_eq!(player.state(), PlayerState::Initialized);
}
