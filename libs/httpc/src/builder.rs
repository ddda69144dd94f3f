use crate::body::{RequestBody, ResponseBody};
use crate::client::HttpClient;
use crate::config::{
    DEFAULT_API_KEY_HEADER, DEFAULT_REQUEST_ID_HEADER, HttpClientConfig, RetryConfig,
    TlsRootConfig,
};
use crate::error::HttpError;
use crate::layers::{
    BasicAuthLayer, BearerAuthLayer, BlocklistLayer, DebugLayer, HeaderLayer, LogSink,
    LoggingLayer, RetryLayer,
};
use crate::transport::{self, Transport};
use http::header::{ACCEPT, CONTENT_TYPE, HeaderName, USER_AGENT};
use http::{HeaderMap, HeaderValue, Request, Response};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tower::Layer;

/// One step of chain construction: takes the chain built so far and returns
/// it wrapped.
type Wrapper = Box<dyn FnOnce(Transport) -> Transport + Send>;

/// Builder for constructing an [`HttpClient`] with a layered tower middleware
/// stack.
///
/// # Chain order
///
/// Wrapper options (`bearer_auth`, `basic_auth`, `inject_headers`,
/// `blocked_domains`, `retry`, `logger`, `debug`, `layer`, `interceptor`) are
/// applied in the order they are called, each one wrapping everything added
/// before it. The **last** wrapper added therefore sees the request **first**
/// and the response **last**:
///
/// ```ignore
/// let client = HttpClient::builder()
///     .retry(RetryConfig::new(3, Duration::from_millis(200)))
///     .logger(TracingSink)        // logs once per call, not per attempt
///     .build()?;
/// ```
///
/// Swap the two and every attempt is logged. The default retry condition
/// retries every error, so add `blocked_domains` after `retry` to keep
/// blocked requests from being retried.
///
/// Header options (`header`, `headers`, `api_key`, `request_id`,
/// `user_agent`, `content_type`, `accept`) set client default headers, which
/// a request can override per name.
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    default_headers: HeaderMap,
    wrappers: Vec<Wrapper>,
    base: Option<Transport>,
    /// First error hit while configuring (deferred to `build()`)
    error: Option<HttpError>,
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self {
            config,
            default_headers: HeaderMap::new(),
            wrappers: Vec::new(),
            base: None,
            error: None,
        }
    }

    fn fail(&mut self, error: HttpError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn wrap(mut self, wrapper: impl FnOnce(Transport) -> Transport + Send + 'static) -> Self {
        self.wrappers.push(Box::new(wrapper));
        self
    }

    fn default_header(mut self, name: HeaderName, value: &str) -> Self {
        match HeaderValue::try_from(value) {
            Ok(value) => {
                self.default_headers.insert(name, value);
            }
            Err(e) => self.fail(e.into()),
        }
        self
    }

    /// Set the base URL that relative request URLs are resolved against
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Set the timeout for a whole request, retries and backoff included.
    ///
    /// `Duration::ZERO` disables it. A per-request timeout replaces it.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set a default header. A later call with the same name replaces it.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match HeaderName::try_from(name) {
            Ok(name) => self.default_header(name, value),
            Err(e) => {
                self.fail(e.into());
                self
            }
        }
    }

    /// Set several default headers
    #[must_use]
    pub fn headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        headers
            .into_iter()
            .fold(self, |builder, (name, value)| {
                builder.header(name.as_ref(), value.as_ref())
            })
    }

    /// Set `User-Agent`, replacing the built-in `httpc/<version>`
    #[must_use]
    pub fn user_agent(self, user_agent: &str) -> Self {
        self.default_header(USER_AGENT, user_agent)
    }

    /// Set a default `Content-Type`
    #[must_use]
    pub fn content_type(self, content_type: &str) -> Self {
        self.default_header(CONTENT_TYPE, content_type)
    }

    /// Set `Accept`, replacing the built-in `*/*`
    #[must_use]
    pub fn accept(self, accept: &str) -> Self {
        self.default_header(ACCEPT, accept)
    }

    /// Send `key` in the `X-Api-Key` header
    #[must_use]
    pub fn api_key(self, key: &str) -> Self {
        self.api_key_with_header(DEFAULT_API_KEY_HEADER, key)
    }

    /// Send `key` in the `name` header; an empty name means `X-Api-Key`
    #[must_use]
    pub fn api_key_with_header(self, name: &str, key: &str) -> Self {
        let name = if name.is_empty() {
            DEFAULT_API_KEY_HEADER
        } else {
            name
        };
        self.header(name, key)
    }

    /// Send a request ID in `X-Request-Id`.
    ///
    /// The ID (`req-<uuid>`) is generated once here and shared by every
    /// request of the client.
    #[must_use]
    pub fn request_id(self) -> Self {
        self.request_id_with_header(DEFAULT_REQUEST_ID_HEADER)
    }

    /// Send a request ID in the `name` header; an empty name means
    /// `X-Request-Id`
    #[must_use]
    pub fn request_id_with_header(self, name: &str) -> Self {
        let name = if name.is_empty() {
            DEFAULT_REQUEST_ID_HEADER
        } else {
            name
        };
        let id = format!("req-{}", uuid::Uuid::new_v4());
        self.header(name, &id)
    }

    /// Wrap the chain with a layer that sets `headers` on every request,
    /// replacing same-named ones
    #[must_use]
    pub fn inject_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        match HeaderLayer::try_from_pairs(headers) {
            Ok(layer) => self.layer(layer),
            Err(e) => {
                self.fail(e);
                self
            }
        }
    }

    /// Wrap the chain with `Authorization: Bearer <token>`
    #[must_use]
    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        let token = SecretString::from(token.into());
        match BearerAuthLayer::try_new(&token) {
            Ok(layer) => self.layer(layer),
            Err(e) => {
                self.fail(e);
                self
            }
        }
    }

    /// Wrap the chain with `Authorization: Basic base64(username:password)`
    #[must_use]
    pub fn basic_auth(mut self, username: &str, password: impl Into<String>) -> Self {
        let password = SecretString::from(password.into());
        match BasicAuthLayer::try_new(username, &password) {
            Ok(layer) => self.layer(layer),
            Err(e) => {
                self.fail(e);
                self
            }
        }
    }

    /// Wrap the chain with a blocklist: any request whose host contains one
    /// of `domains` fails with `HttpError::BlockedDomain`
    #[must_use]
    pub fn blocked_domains<I, D>(self, domains: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        self.layer(BlocklistLayer::new(domains))
    }

    /// Wrap the chain with retries
    #[must_use]
    pub fn retry(self, config: RetryConfig) -> Self {
        self.layer(RetryLayer::new(config))
    }

    /// Wrap the chain with one-line request/outcome logging into `sink`
    #[must_use]
    pub fn logger(self, sink: impl LogSink + 'static) -> Self {
        self.layer(LoggingLayer::new(Arc::new(sink)))
    }

    /// Wrap the chain with full request/response tracing through `tracing`.
    ///
    /// Use [`layer`](Self::layer) with a configured [`DebugLayer`] for a
    /// custom sink or body settings.
    #[must_use]
    pub fn debug(self, enabled: bool) -> Self {
        self.layer(DebugLayer::new(enabled))
    }

    /// Wrap the chain with any tower layer over the type-erased transport
    #[must_use]
    pub fn layer<L>(self, layer: L) -> Self
    where
        L: Layer<Transport> + Send + 'static,
        L::Service: tower::Service<
                Request<RequestBody>,
                Response = Response<ResponseBody>,
                Error = HttpError,
            > + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as tower::Service<Request<RequestBody>>>::Future: Send + 'static,
    {
        self.wrap(move |inner| transport::layered(&layer, inner))
    }

    /// Wrap the chain with a function from transport to transport
    ///
    /// ```ignore
    /// let client = HttpClient::builder()
    ///     .interceptor(|inner: Transport| {
    ///         Transport::new(inner.map_request(|mut req: http::Request<RequestBody>| {
    ///             req.headers_mut().insert("x-stage", HeaderValue::from_static("canary"));
    ///             req
    ///         }))
    ///     })
    ///     .build()?;
    /// ```
    #[must_use]
    pub fn interceptor<F>(self, interceptor: F) -> Self
    where
        F: FnOnce(Transport) -> Transport + Send + 'static,
    {
        self.wrap(interceptor)
    }

    /// Set the maximum response body size, after gzip decoding
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set the TCP connect timeout; `None` waits for the OS
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set how many redirects are followed; 0 returns every 3xx as is
    #[must_use]
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.redirect.max_redirects = max_redirects;
        self
    }

    /// Set the TLS root certificate store
    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Set the idle timeout of pooled connections; `None` keeps them
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum number of idle pooled connections per host
    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Replace the base transport (the hyper client) with `transport`.
    ///
    /// Wrappers are still stacked on top of it.
    #[must_use]
    pub fn transport(mut self, transport: Transport) -> Self {
        self.base = Some(transport);
        self
    }

    /// Build the HTTP client
    ///
    /// # Errors
    ///
    /// Returns the first configuration error (invalid header name or value,
    /// unusable credentials) or `HttpError::Tls` if the TLS root store cannot
    /// be set up.
    pub fn build(self) -> Result<HttpClient, HttpError> {
        if let Some(e) = self.error {
            return Err(e);
        }

        let base = match self.base {
            Some(base) => base,
            None => transport::base_transport(&self.config)?,
        };
        let chain = self
            .wrappers
            .into_iter()
            .fold(base, |inner, wrap| wrap(inner));

        Ok(HttpClient::from_parts(&self.config, self.default_headers, chain))
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientBuilder")
            .field("config", &self.config)
            .field("wrappers", &self.wrappers.len())
            .field("custom_transport", &self.base.is_some())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
