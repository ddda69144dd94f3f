use bytes::Bytes;
use http::StatusCode;
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// Structured error for a non-2xx response.
///
/// Never produced by the transport on its own: a request that completes with
/// any status is `Ok`. Build one with [`HttpResponse::error_for_status`] or
/// [`StatusError::new`] when a failing status should become an error.
///
/// [`HttpResponse::error_for_status`]: crate::HttpResponse::error_for_status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    /// HTTP status returned by the server
    pub status: StatusCode,
    /// Human-readable message
    pub message: String,
    /// Raw response body, possibly empty
    pub body: Bytes,
}

impl StatusError {
    /// Create a status error with an empty body
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            body: Bytes::new(),
        }
    }

    /// Attach the raw response body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Request failed with status {}: {}",
            self.status.as_u16(),
            self.message
        )
    }
}

impl StdError for StatusError {}

/// HTTP client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Client or per-request timeout elapsed
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Caller-supplied deadline passed
    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// Request cancelled through its [`RequestContext`](crate::RequestContext)
    #[error("Request cancelled")]
    Cancelled,

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn StdError + Send + Sync>),

    /// Request host matched a blocked domain
    #[error("domain {domain} is blocked")]
    BlockedDomain {
        /// Blocklist entry that matched the request host
        domain: String,
    },

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Response body stream was already consumed by a failed read
    #[error("Response body already consumed")]
    BodyClosed,

    /// Gzip decoding failed; `raw` holds the undecoded body
    #[error("Failed to decode gzip body: {source}")]
    Decompress {
        #[source]
        source: std::io::Error,
        /// Compressed bytes as received
        raw: Bytes,
    },

    /// HTTP non-2xx status
    #[error(transparent)]
    HttpStatus(#[from] StatusError),

    /// JSON encoding or decoding error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// XML decoding error
    #[error("XML parsing failed: {0}")]
    Xml(#[from] quick_xml::de::DeError),

    /// XML encoding error
    #[error("XML encoding failed: {0}")]
    XmlEncode(#[from] quick_xml::se::SeError),

    /// CSV decoding error
    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },
}

impl HttpError {
    /// Whether this error represents an elapsed timeout or deadline.
    ///
    /// Besides [`HttpError::Timeout`] and [`HttpError::DeadlineExceeded`], any
    /// `io::ErrorKind::TimedOut` found in the source chain counts.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        if matches!(self, Self::Timeout(_) | Self::DeadlineExceeded(_)) {
            return true;
        }

        let mut current: Option<&(dyn StdError + 'static)> = self.source();
        while let Some(err) = current {
            if let Some(io) = err.downcast_ref::<std::io::Error>()
                && io.kind() == std::io::ErrorKind::TimedOut
            {
                return true;
            }
            if let Some(inner) = err.downcast_ref::<HttpError>()
                && inner.is_timeout()
            {
                return true;
            }
            current = err.source();
        }
        false
    }

    /// Status error carried by this error, if any
    #[must_use]
    pub fn status_error(&self) -> Option<&StatusError> {
        match self {
            Self::HttpStatus(status) => Some(status),
            _ => None,
        }
    }
}

/// Free-function form of [`HttpError::is_timeout`].
#[must_use]
pub fn is_timeout(err: &HttpError) -> bool {
    err.is_timeout()
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}
