use std::time::Duration;

use brook::net::{Feed, FeedMessage, FeedRequest, HttpClient, HttpFeed, NetOptions};
use brook_test_utils::{AudioServer, pattern};
use rstest::*;

use crate::common::{STEP, body_of, collect_feed};

#[fixture]
async fn server() -> AudioServer {
    AudioServer::new(pattern(20_000)).await
}

fn feed() -> HttpFeed {
    HttpFeed::current(HttpClient::new(NetOptions::default()).unwrap()).unwrap()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn delivers_headers_then_body_then_completion(#[future] server: AudioServer) {
    let server = server.await;
    let mut feed = feed();
    let (tx, rx) = kanal::unbounded();
    feed.open(FeedRequest::new(server.url("/track.mp3")), tx)
        .unwrap();

    let messages = collect_feed(rx).await;
    assert_eq!(
        messages.first(),
        Some(&FeedMessage::ResponseHeaders {
            expected_length: Some(20_000)
        })
    );
    assert_eq!(messages.last(), Some(&FeedMessage::Complete(None)));
    assert_eq!(body_of(&messages), server.payload.to_vec());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn resumes_from_offset_with_range_request(#[future] server: AudioServer) {
    let server = server.await;
    let mut feed = feed();
    let (tx, rx) = kanal::unbounded();
    let request = FeedRequest::new(server.url("/track.mp3"))
        .with_start_offset(12_000)
        .with_total_length(Some(20_000));
    feed.open(request, tx).unwrap();

    let messages = collect_feed(rx).await;
    assert_eq!(
        messages.first(),
        Some(&FeedMessage::ResponseHeaders {
            expected_length: Some(8_000)
        })
    );
    assert_eq!(body_of(&messages), server.payload[12_000..].to_vec());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn resume_against_server_ignoring_range_fails(#[future] server: AudioServer) {
    let server = server.await;
    let mut feed = feed();
    let (tx, rx) = kanal::unbounded();
    let request = FeedRequest::new(server.url("/no-range.mp3"))
        .with_start_offset(12_000)
        .with_total_length(Some(20_000));
    feed.open(request, tx).unwrap();

    let messages = collect_feed(rx).await;
    match messages.as_slice() {
        [FeedMessage::Complete(Some(err))] => assert_eq!(err.status_code(), Some(200)),
        other => panic!("unexpected messages: {other:?}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn http_error_completes_with_error(#[future] server: AudioServer) {
    let server = server.await;
    let mut feed = feed();
    let (tx, rx) = kanal::unbounded();
    feed.open(FeedRequest::new(server.url("/missing.mp3")), tx)
        .unwrap();

    let messages = collect_feed(rx).await;
    match messages.as_slice() {
        [FeedMessage::Complete(Some(err))] => assert_eq!(err.status_code(), Some(404)),
        other => panic!("unexpected messages: {other:?}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn broken_connection_completes_with_error(#[future] server: AudioServer) {
    let server = server.await;
    let mut feed = feed();
    let (tx, rx) = kanal::unbounded();
    feed.open(FeedRequest::new(server.url("/truncated.mp3")), tx)
        .unwrap();

    let messages = collect_feed(rx).await;
    assert!(matches!(messages.last(), Some(FeedMessage::Complete(Some(_)))));
    let body = body_of(&messages);
    assert!(body.len() < server.payload.len());
    assert_eq!(body, server.payload[..body.len()].to_vec());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancel_stops_delivery(#[future] server: AudioServer) {
    let server = server.await;
    let mut feed = feed();
    let (tx, rx) = kanal::unbounded();
    feed.open(FeedRequest::new(server.url("/slow.mp3")), tx)
        .unwrap();

    let rx = tokio::task::spawn_blocking(move || {
        // Wait for the first chunk, then hang up.
        loop {
            if let FeedMessage::Bytes(_) = rx.recv_timeout(STEP).unwrap() {
                break;
            }
        }
        rx
    })
    .await
    .unwrap();
    feed.cancel();
    assert!(!feed.is_open());

    let tail = tokio::task::spawn_blocking(move || {
        let mut tail = Vec::new();
        while let Ok(message) = rx.recv_timeout(Duration::from_millis(200)) {
            tail.push(message);
        }
        tail
    })
    .await
    .unwrap();
    assert!(!tail.iter().any(|m| matches!(m, FeedMessage::Complete(_))));
}
