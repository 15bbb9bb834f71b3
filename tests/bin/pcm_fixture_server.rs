//! Standalone fixture server for the `stream_pcm` example.
//!
//! Serves one minute of a 16-bit stereo sine at 44.1 kHz on a fixed port.
//!
//! ```bash
//! cargo run -p brook-tests --bin pcm_fixture_server
//! # → Listening on http://127.0.0.1:3333/track.pcm
//! ```

use brook_test_utils::{audio_router, pcm_tone};
use tokio::net::TcpListener;
use tracing::info;

const PORT: u16 = 3333;
const SAMPLE_RATE: usize = 44_100;
const SECONDS: usize = 60;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let router = audio_router(pcm_tone(SAMPLE_RATE * SECONDS, 2).into());
    let listener = TcpListener::bind(("127.0.0.1", PORT)).await?;
    info!("Listening on http://127.0.0.1:{PORT}/track.pcm");

    tokio::select! {
        served = axum::serve(listener, router).into_future() => served?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}
