use brook::net::{HttpClient, Net, NetError, NetOptions, RangeSpec};
use brook_test_utils::{AudioServer, pattern};
use futures::StreamExt;
use rstest::*;

// Fixtures

#[fixture]
fn http_client() -> HttpClient {
    HttpClient::new(NetOptions::default()).unwrap()
}

#[fixture]
async fn server() -> AudioServer {
    AudioServer::new(pattern(10_000)).await
}

async fn read_all(mut body: brook::net::ByteStream) -> Result<Vec<u8>, NetError> {
    let mut collected = Vec::new();
    while let Some(chunk) = body.next().await {
        collected.extend_from_slice(&chunk?);
    }
    Ok(collected)
}

#[rstest]
#[tokio::test]
async fn stream_returns_whole_body_and_length(
    http_client: HttpClient,
    #[future] server: AudioServer,
) {
    let server = server.await;
    let response = http_client
        .stream(server.url("/track.mp3"), None)
        .await
        .unwrap();
    assert_eq!(response.content_length, Some(10_000));
    assert_eq!(read_all(response.body).await.unwrap(), server.payload.to_vec());
}

#[rstest]
#[case::open_ended(RangeSpec::from_start(9_000), 9_000..10_000)]
#[case::bounded(RangeSpec::new(100, Some(199)), 100..200)]
#[tokio::test]
async fn get_range_returns_requested_slice(
    http_client: HttpClient,
    #[future] server: AudioServer,
    #[case] range: RangeSpec,
    #[case] expected: std::ops::Range<usize>,
) {
    let server = server.await;
    let response = http_client
        .get_range(server.url("/track.mp3"), range, None)
        .await
        .unwrap();
    assert_eq!(response.content_length, Some(expected.len() as u64));
    assert_eq!(
        read_all(response.body).await.unwrap(),
        server.payload[expected].to_vec()
    );
}

#[rstest]
#[tokio::test]
async fn missing_resource_is_status_error(
    http_client: HttpClient,
    #[future] server: AudioServer,
) {
    let server = server.await;
    let err = http_client
        .stream(server.url("/missing.mp3"), None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(404));
}

#[rstest]
#[tokio::test]
async fn unsatisfiable_range_is_status_error(
    http_client: HttpClient,
    #[future] server: AudioServer,
) {
    let server = server.await;
    let err = http_client
        .get_range(server.url("/track.mp3"), RangeSpec::from_start(50_000), None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(416));
}

#[rstest]
#[tokio::test]
async fn full_reply_to_ranged_read_is_rejected(
    http_client: HttpClient,
    #[future] server: AudioServer,
) {
    let server = server.await;
    let err = http_client
        .get_range(server.url("/no-range.mp3"), RangeSpec::from_start(600), None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(200));

    // The same route is fine for a plain read.
    let response = http_client
        .stream(server.url("/no-range.mp3"), None)
        .await
        .unwrap();
    assert_eq!(read_all(response.body).await.unwrap(), server.payload.to_vec());
}

#[rstest]
#[tokio::test]
async fn inverted_range_is_rejected_locally(http_client: HttpClient) {
    let url = url::Url::parse("http://127.0.0.1:9/never").unwrap();
    let err = http_client
        .get_range(url, RangeSpec::new(10, Some(5)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::InvalidRange(_)));
}

#[rstest]
#[tokio::test]
async fn truncated_body_surfaces_as_error(
    http_client: HttpClient,
    #[future] server: AudioServer,
) {
    let server = server.await;
    let response = http_client
        .stream(server.url("/truncated.mp3"), None)
        .await
        .unwrap();
    assert!(read_all(response.body).await.is_err());
}
