use thiserror::Error;

/// Errors raised while fetching the source over HTTP.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Timeout")]
    Timeout,
    #[error("no tokio runtime available to drive the feed")]
    NoRuntime,
    #[error("feed already open")]
    AlreadyOpen,
}

impl NetError {
    /// Creates an HTTP status error
    pub fn http_status(status: u16, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    /// Creates an HTTP error from a generic string
    pub fn http<S: Into<String>>(msg: S) -> Self {
        Self::Http(msg.into())
    }

    /// Checks if this error indicates a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetError::Timeout)
    }

    /// Gets the HTTP status code if this is an HTTP status error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            NetError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NetError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout;
        }
        if let Some(status) = error.status() {
            let url = error.url().map(ToString::to_string).unwrap_or_default();
            return Self::http_status(status.as_u16(), url);
        }
        Self::Http(error.to_string())
    }
}

pub type NetResult<T> = Result<T, NetError>;
