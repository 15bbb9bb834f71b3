use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use url::Url;

use crate::{
    error::NetError,
    types::{Headers, RangeSpec},
};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, NetError>> + Send>>;

/// Response body plus the length the server announced for it.
pub struct ByteResponse {
    /// `Content-Length` of this response, if the server sent one.
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl std::fmt::Debug for ByteResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteResponse")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Net: Send + Sync {
    /// Stream bytes from a URL
    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<ByteResponse, NetError>;

    /// Stream a range of bytes from a URL. Any reply other than
    /// `206 Partial Content` is an [`NetError::HttpStatus`].
    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<ByteResponse, NetError>;
}
