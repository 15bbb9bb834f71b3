//! Async HTTP test servers.

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use tokio::net::TcpListener;
use url::Url;

/// Lightweight HTTP test server wrapper.
pub struct TestHttpServer {
    base_url: Url,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestHttpServer {
    /// Spawn `router` on a random localhost port.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn new(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test HTTP listener");
        let addr = listener
            .local_addr()
            .expect("read test listener local addr");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        });
        tokio::spawn(async move {
            server.await.expect("run test HTTP server");
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}")).expect("parse base URL"),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// # Panics
    ///
    /// Panics if `path` does not join onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> Url {
        self.base_url.join(path).expect("join server URL path")
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl Drop for TestHttpServer {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

/// Routes serving one audio payload:
///
/// - `/track.mp3`, `/track.pcm`: the payload, honouring `Range: bytes=a-b`
/// - `/no-range.mp3`: the whole payload with `200 OK`, ignoring `Range`
/// - `/slow.mp3`: the payload in 1 KiB chunks, 5 ms apart
/// - `/truncated.mp3`: half the payload, then a broken connection
/// - `/missing.mp3`: 404
pub fn audio_router(payload: Bytes) -> Router {
    Router::new()
        .route("/track.mp3", get(ranged))
        .route("/track.pcm", get(ranged))
        .route("/no-range.mp3", get(whole))
        .route("/slow.mp3", get(slow))
        .route("/truncated.mp3", get(truncated))
        .route("/missing.mp3", get(|| async { StatusCode::NOT_FOUND }))
        .with_state(payload)
}

/// [`TestHttpServer`] running [`audio_router`].
pub struct AudioServer {
    pub server: TestHttpServer,
    pub payload: Bytes,
}

impl AudioServer {
    pub async fn new(payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let server = TestHttpServer::new(audio_router(payload.clone())).await;
        Self { server, payload }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> Url {
        self.server.url(path)
    }
}

fn parse_range(headers: &HeaderMap, len: u64) -> Option<Result<(u64, u64), ()>> {
    let value = headers.get(header::RANGE)?.to_str().ok()?;
    let Some(spec) = value.strip_prefix("bytes=") else {
        return Some(Err(()));
    };
    let (start, end) = spec.split_once('-')?;
    let start = start.parse::<u64>().map_err(|_| ());
    let end = if end.is_empty() {
        Ok(len.saturating_sub(1))
    } else {
        end.parse::<u64>().map_err(|_| ())
    };
    Some(match (start, end) {
        (Ok(start), Ok(end)) if start <= end && end < len => Ok((start, end)),
        _ => Err(()),
    })
}

async fn ranged(State(payload): State<Bytes>, headers: HeaderMap) -> Response {
    let len = payload.len() as u64;
    match parse_range(&headers, len) {
        None => (StatusCode::OK, payload).into_response(),
        Some(Ok((start, end))) => {
            let slice = payload.slice(start as usize..=end as usize);
            let mut out = HeaderMap::new();
            out.insert(
                header::CONTENT_RANGE,
                format!("bytes {start}-{end}/{len}")
                    .parse()
                    .expect("content-range header"),
            );
            (StatusCode::PARTIAL_CONTENT, out, slice).into_response()
        }
        Some(Err(())) => StatusCode::RANGE_NOT_SATISFIABLE.into_response(),
    }
}

async fn whole(State(payload): State<Bytes>) -> Response {
    (StatusCode::OK, payload).into_response()
}

async fn slow(State(payload): State<Bytes>) -> Response {
    let chunks: Vec<Bytes> = payload.chunks(1024).map(Bytes::copy_from_slice).collect();
    let stream = futures::StreamExt::then(futures::stream::iter(chunks), |chunk| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok::<_, std::io::Error>(chunk)
    });
    Response::builder()
        .status(StatusCode::OK)
        .body(Body::from_stream(stream))
        .expect("slow response")
}

async fn truncated(State(payload): State<Bytes>) -> Response {
    let half = payload.slice(..payload.len() / 2);
    let stream = futures::stream::iter([
        Ok(half),
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection dropped",
        )),
    ]);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, payload.len())
        .body(Body::from_stream(stream))
        .expect("truncated response")
}
