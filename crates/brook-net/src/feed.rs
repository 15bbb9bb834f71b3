//! Callback-style network feed.
//!
//! The player's driver thread does not poll futures. It opens a [`Feed`] with
//! a [`FeedRequest`] and receives [`FeedMessage`]s on a channel: at most one
//! `ResponseHeaders`, any number of `Bytes` chunks (no alignment to anything
//! in the payload), then exactly one `Complete`.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::{runtime::Handle, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
    client::HttpClient,
    error::{NetError, NetResult},
    traits::{ByteResponse, Net},
    types::RangeSpec,
};

/// Sending half handed to a feed. Expected to be unbounded: the feed never
/// waits for the consumer.
pub type FeedSender = kanal::Sender<FeedMessage>;

/// What to fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedRequest {
    pub url: Url,
    /// Byte offset to resume from (0 = from the beginning).
    pub start_offset: u64,
    /// Total file length, if known from an earlier response.
    pub total_length: Option<u64>,
}

impl FeedRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            start_offset: 0,
            total_length: None,
        }
    }

    #[must_use]
    pub fn with_start_offset(mut self, offset: u64) -> Self {
        self.start_offset = offset;
        self
    }

    #[must_use]
    pub fn with_total_length(mut self, total: Option<u64>) -> Self {
        self.total_length = total;
        self
    }

    /// The `Range` to request, or `None` for a plain GET.
    pub fn range(&self) -> Option<RangeSpec> {
        RangeSpec::resume(self.start_offset, self.total_length)
    }
}

/// Notifications emitted by a feed, in delivery order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedMessage {
    /// Response accepted. `expected_length` is the body length of this
    /// response, not of the whole file.
    ResponseHeaders { expected_length: Option<u64> },
    /// Next chunk of the body.
    Bytes(Bytes),
    /// Transfer finished; `Some` on failure.
    Complete(Option<NetError>),
}

/// A source of bytes for the player.
pub trait Feed: Send + 'static {
    /// Issue the read. Messages arrive on `tx` from whatever thread the feed uses.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be issued at all.
    fn open(&mut self, request: FeedRequest, tx: FeedSender) -> NetResult<()>;

    /// Abort an in-flight read. No further messages are sent after this returns.
    fn cancel(&mut self);
}

/// [`Feed`] backed by an HTTP client running on a tokio runtime.
pub struct HttpFeed {
    net: Arc<dyn Net>,
    runtime: Handle,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HttpFeed {
    pub fn new<N: Net + 'static>(net: N, runtime: Handle) -> Self {
        Self {
            net: Arc::new(net),
            runtime,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Build a feed on the runtime the caller is running in.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::NoRuntime`] outside a tokio runtime.
    pub fn current(client: HttpClient) -> NetResult<Self> {
        let runtime = Handle::try_current().map_err(|_| NetError::NoRuntime)?;
        Ok(Self::new(client, runtime))
    }

    pub fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Feed for HttpFeed {
    fn open(&mut self, request: FeedRequest, tx: FeedSender) -> NetResult<()> {
        if self.task.is_some() {
            return Err(NetError::AlreadyOpen);
        }
        debug!(url = %request.url, range = ?request.range(), "opening feed");
        let task = run_feed(
            Arc::clone(&self.net),
            request,
            tx,
            self.cancel.child_token(),
        );
        self.task = Some(self.runtime.spawn(task));
        Ok(())
    }

    fn cancel(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for HttpFeed {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn fetch(net: &dyn Net, request: &FeedRequest) -> NetResult<ByteResponse> {
    match request.range() {
        Some(range) => net.get_range(request.url.clone(), range, None).await,
        None => net.stream(request.url.clone(), None).await,
    }
}

async fn run_feed(
    net: Arc<dyn Net>,
    request: FeedRequest,
    tx: FeedSender,
    cancel: CancellationToken,
) {
    let response = tokio::select! {
        () = cancel.cancelled() => return,
        r = fetch(net.as_ref(), &request) => r,
    };

    let mut response = match response {
        Ok(r) => r,
        Err(e) => {
            warn!(url = %request.url, error = %e, "feed request failed");
            let _ = tx.send(FeedMessage::Complete(Some(e)));
            return;
        }
    };

    let headers = FeedMessage::ResponseHeaders {
        expected_length: response.content_length,
    };
    if tx.send(headers).is_err() {
        return;
    }

    let mut delivered: u64 = 0;
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                trace!(delivered, "feed cancelled");
                return;
            }
            n = response.body.next() => n,
        };

        match next {
            Some(Ok(chunk)) => {
                if chunk.is_empty() {
                    continue;
                }
                delivered += chunk.len() as u64;
                if tx.send(FeedMessage::Bytes(chunk)).is_err() {
                    trace!(delivered, "feed receiver dropped");
                    return;
                }
            }
            Some(Err(e)) => {
                warn!(delivered, error = %e, "feed body failed");
                let _ = tx.send(FeedMessage::Complete(Some(e)));
                return;
            }
            None => {
                debug!(delivered, "feed complete");
                let _ = tx.send(FeedMessage::Complete(None));
                return;
            }
        }
    }
}
