use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::{
    error::{NetError, NetResult},
    traits::{ByteResponse, Net},
    types::{Headers, NetOptions, RangeSpec},
};

#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    options: NetOptions,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns [`NetError::Http`] if the underlying client cannot be built
    /// (e.g. TLS backend initialisation failure).
    pub fn new(options: NetOptions) -> NetResult<Self> {
        let inner = Client::builder()
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .connect_timeout(options.request_timeout)
            .build()
            .map_err(|e| NetError::http(e.to_string()))?;
        Ok(Self { inner, options })
    }

    pub fn options(&self) -> &NetOptions {
        &self.options
    }

    fn apply_headers(
        mut req: reqwest::RequestBuilder,
        headers: Option<Headers>,
    ) -> reqwest::RequestBuilder {
        if let Some(headers) = headers {
            for (k, v) in headers.iter() {
                req = req.header(k, v);
            }
        }
        req
    }

    async fn send(
        &self,
        url: Url,
        req: reqwest::RequestBuilder,
        ranged: bool,
    ) -> NetResult<ByteResponse> {
        let resp = tokio::time::timeout(self.options.request_timeout, req.send())
            .await
            .map_err(|_| NetError::Timeout)?
            .map_err(NetError::from)?;
        let status = resp.status();

        // A ranged read must be answered with the range, not the whole file.
        let ok = if ranged {
            status == StatusCode::PARTIAL_CONTENT
        } else {
            status.is_success()
        };
        if !ok {
            return Err(NetError::http_status(status.as_u16(), url.as_str()));
        }

        let content_length = resp.content_length();
        debug!(%url, status = status.as_u16(), ?content_length, "response received");

        let body = resp.bytes_stream().map_err(NetError::from);
        Ok(ByteResponse {
            content_length,
            body: Box::pin(body),
        })
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<ByteResponse, NetError> {
        let req = Self::apply_headers(self.inner.get(url.clone()), headers);
        // No body timeout for streaming - downloads can take arbitrary time
        self.send(url, req, false).await
    }

    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<ByteResponse, NetError> {
        if range.end.is_some_and(|end| end < range.start) {
            return Err(NetError::InvalidRange(range.to_header_value()));
        }
        let req = self
            .inner
            .get(url.clone())
            .header(reqwest::header::RANGE, range.to_header_value());
        let req = Self::apply_headers(req, headers);
        self.send(url, req, true).await
    }
}
