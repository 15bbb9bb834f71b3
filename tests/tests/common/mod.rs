// Common fixtures and helpers for integration tests

use std::time::Duration;

use brook::net::FeedMessage;

/// How long any single step of a test may take.
pub const STEP: Duration = Duration::from_secs(5);

/// Receive feed messages until completion, on a blocking thread.
pub async fn collect_feed(rx: kanal::Receiver<FeedMessage>) -> Vec<FeedMessage> {
    tokio::task::spawn_blocking(move || {
        let mut messages = Vec::new();
        while let Ok(message) = rx.recv_timeout(STEP) {
            let done = matches!(message, FeedMessage::Complete(_));
            messages.push(message);
            if done {
                break;
            }
        }
        messages
    })
    .await
    .unwrap()
}

/// Concatenated payload of every `Bytes` message.
pub fn body_of(messages: &[FeedMessage]) -> Vec<u8> {
    messages
        .iter()
        .filter_map(|m| match m {
            FeedMessage::Bytes(b) => Some(b.as_ref()),
            _ => None,
        })
        .flatten()
        .copied()
        .collect()
}
