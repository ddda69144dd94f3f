use crate::body::ResponseBody;
use crate::error::HttpError;
use http::Response;
use std::sync::Arc;
use std::time::Duration;

/// Default User-Agent string, sent when neither the caller nor the client
/// configuration sets one
pub const DEFAULT_USER_AGENT: &str = concat!("httpc/", env!("CARGO_PKG_VERSION"));

/// Default `Accept` value filled in by the transport
pub const DEFAULT_ACCEPT: &str = "*/*";

/// Default `Accept-Encoding` value filled in by the transport.
///
/// Only gzip is advertised because it is the only coding the response
/// wrapper decodes.
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip";

/// Header used by [`HttpClientBuilder::api_key`](crate::HttpClientBuilder::api_key)
/// when no name is given
pub const DEFAULT_API_KEY_HEADER: &str = "X-Api-Key";

/// Header used by [`HttpClientBuilder::request_id`](crate::HttpClientBuilder::request_id)
/// when no name is given
pub const DEFAULT_REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Default client timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum bytes drained from a discarded response before a retry
pub const DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT: usize = 64 * 1024;

/// Outcome of one attempt, as seen by a retry predicate
pub type RetryOutcome = Result<Response<ResponseBody>, HttpError>;

/// Decides whether an attempt should be retried
pub type RetryPredicate = Arc<dyn Fn(&RetryOutcome) -> bool + Send + Sync>;

/// Retries on any error, on 5xx and on 429.
///
/// Any error includes local ones such as [`HttpError::BlockedDomain`] when a
/// blocklist sits inside the retry wrapper.
#[must_use]
pub fn default_retry_condition(outcome: &RetryOutcome) -> bool {
    match outcome {
        Err(_) => true,
        Ok(resp) => {
            let status = resp.status();
            status.is_server_error() || status == http::StatusCode::TOO_MANY_REQUESTS
        }
    }
}

/// Retry policy with linear backoff.
///
/// Attempt `n` (0-based) that the predicate wants retried is followed by a
/// sleep of `backoff * (n + 1)`. Total calls are at most `max_retries + 1`.
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt (0 = no retries, default: 3)
    pub max_retries: usize,

    /// Base delay between attempts (default: 1s)
    pub backoff: Duration,

    /// Retry decision for each attempt (default: [`default_retry_condition`])
    pub retry_if: RetryPredicate,

    /// Maximum bytes to drain from a discarded response body before retrying.
    /// Draining lets the connection go back to the pool. Default: 64 KiB.
    pub retry_response_drain_limit: usize,
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("retry_response_drain_limit", &self.retry_response_drain_limit)
            .finish_non_exhaustive()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(1),
            retry_if: Arc::new(default_retry_condition),
            retry_response_drain_limit: DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT,
        }
    }
}

impl RetryConfig {
    /// Create a config with the default predicate
    #[must_use]
    pub fn new(max_retries: usize, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
            ..Default::default()
        }
    }

    /// Create config with no retries
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Replace the retry predicate
    #[must_use]
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RetryOutcome) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Arc::new(predicate);
        self
    }

    /// Delay before the attempt following 0-based `attempt`
    #[must_use]
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt.saturating_add(1)).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor)
    }
}

/// Configuration for redirect behavior
///
/// Redirects are followed across hosts. Credentials never follow a redirect
/// to another origin and HTTPS → HTTP downgrades stop the chain.
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    /// Maximum number of redirects to follow (default: 10)
    ///
    /// Set to `0` to disable redirect following entirely.
    pub max_redirects: usize,

    /// Strip `Authorization`, `Cookie` and `Proxy-Authorization` on
    /// cross-origin redirects (default: true)
    pub strip_sensitive_headers: bool,

    /// Allow HTTPS → HTTP downgrades (default: false)
    pub allow_https_downgrade: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            max_redirects: 10,
            strip_sensitive_headers: true,
            allow_https_downgrade: false,
        }
    }
}

impl RedirectConfig {
    /// Create a configuration that disables redirect following
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_redirects: 0,
            ..Default::default()
        }
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Base transport and client-wide settings.
///
/// Wrapper options (auth, retry, logging, …) are not part of this struct;
/// they are added through [`HttpClientBuilder`](crate::HttpClientBuilder)
/// because their call order defines the chain order.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL that relative request paths are resolved against (default: empty)
    pub base_url: String,

    /// Timeout for a whole request, retries included (default: 30 seconds)
    ///
    /// A per-request timeout set on the request builder replaces it.
    pub timeout: Duration,

    /// TCP connect timeout (default: 30 seconds)
    pub connect_timeout: Option<Duration>,

    /// Maximum response body size in bytes, after gzip decoding (default: 10 MB)
    pub max_body_size: usize,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Redirect policy configuration
    pub redirect: RedirectConfig,

    /// Timeout for idle connections in the pool (default: 90 seconds)
    ///
    /// Set to `None` to keep idle connections indefinitely.
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: Some(Duration::from_secs(30)),
            max_body_size: 10 * 1024 * 1024, // 10 MB
            tls_roots: TlsRootConfig::default(),
            redirect: RedirectConfig::default(),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 10,
        }
    }
}

impl HttpClientConfig {
    /// Create minimal configuration (small timeout, small pool, no redirects)
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Some(Duration::from_secs(5)),
            max_body_size: 1024 * 1024, // 1 MB
            redirect: RedirectConfig::disabled(),
            pool_idle_timeout: Some(Duration::from_secs(30)),
            pool_max_idle_per_host: 2,
            ..Default::default()
        }
    }

    /// Create configuration for tests against local mock servers
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Some(Duration::from_secs(2)),
            max_body_size: 1024 * 1024, // 1 MB
            redirect: RedirectConfig {
                allow_https_downgrade: true,
                ..Default::default()
            },
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Default::default()
        }
    }
}
