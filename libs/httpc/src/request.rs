use crate::body::{self, BoxError, RequestBody};
use crate::client::HttpClient;
use crate::constants::{CONTENT_TYPE_FORM, CONTENT_TYPE_JSON, CONTENT_TYPE_XML};
use crate::context::RequestContext;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::HttpResponse;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName};
use http::{HeaderMap, HeaderValue, Method, Request};
use http_body_util::BodyExt;
use serde::Serialize;
use std::time::Duration;

/// Body type for the request builder
enum BodyKind {
    Empty,
    Bytes(Bytes),
    Json(Bytes),
    Xml(Bytes),
    Form(Bytes),
    Stream(RequestBody),
}

impl BodyKind {
    /// Content type implied by the body, used when the caller set none
    fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Json(_) => Some(CONTENT_TYPE_JSON),
            Self::Xml(_) => Some(CONTENT_TYPE_XML),
            Self::Form(_) => Some(CONTENT_TYPE_FORM),
            Self::Empty | Self::Bytes(_) | Self::Stream(_) => None,
        }
    }

    fn into_body(self) -> RequestBody {
        match self {
            Self::Empty => body::empty(),
            Self::Bytes(b) | Self::Json(b) | Self::Xml(b) | Self::Form(b) => body::full(b),
            Self::Stream(stream) => stream,
        }
    }
}

/// Per-request option accepted by the client's convenience methods.
///
/// ```ignore
/// let users: Vec<User> = client
///     .get_json("/users", &[
///         RequestOption::query("page", "2"),
///         RequestOption::header("x-trace", "on"),
///     ])
///     .await?;
/// ```
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum RequestOption {
    /// Set a header, replacing same-named ones
    Header(String, String),
    /// Append a query parameter
    Query(String, String),
    /// Run the request under this context
    Context(RequestContext),
}

impl RequestOption {
    /// Header option
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Header(name.into(), value.into())
    }

    /// Query parameter option
    pub fn query(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Query(key.into(), value.into())
    }

    /// Context option
    #[must_use]
    pub fn context(ctx: &RequestContext) -> Self {
        Self::Context(ctx.clone())
    }
}

/// HTTP request builder with fluent API
///
/// Created by [`HttpClient::request`], [`HttpClient::get`],
/// [`HttpClient::post`], etc. Errors from invalid headers or failed body
/// serialization are kept until [`send()`](RequestBuilder::send), so chains
/// never need an intermediate `?`.
///
/// # URL Resolution
///
/// - A URL starting with `http://` or `https://` is used as is.
/// - Otherwise it is appended to the client base URL (one trailing slash of
///   the base dropped, a slash inserted when the path lacks one).
/// - Query parameters are merged into any query the URL already has. A URL
///   that does not parse is sent without them.
///
/// # Example
///
/// ```ignore
/// let resp = client
///     .post("/api/users")
///     .header("x-request-source", "import")
///     .query("notify", "false")
///     .json(&new_user)
///     .timeout(Duration::from_secs(10))
///     .send()
///     .await?;
/// ```
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    client: HttpClient,
    method: Method,
    url: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: BodyKind,
    timeout: Option<Duration>,
    context: Option<RequestContext>,
    /// Error captured during building (deferred to `send()`)
    error: Option<HttpError>,
}

impl RequestBuilder {
    pub(crate) fn new(client: HttpClient, method: Method, url: &str) -> Self {
        Self {
            client,
            method,
            url: url.to_owned(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: BodyKind::Empty,
            timeout: None,
            context: None,
            error: None,
        }
    }

    /// Set the HTTP method
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the URL, absolute or relative to the client base URL
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn try_insert_header(&mut self, name: &str, value: &str) {
        if self.error.is_some() {
            return;
        }
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            (Err(e), _) => self.error = Some(HttpError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(HttpError::InvalidHeaderValue(e)),
        }
    }

    /// Set a header. A later call with the same name replaces the value.
    ///
    /// Request headers override the client's default headers.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.try_insert_header(name, value);
        self
    }

    /// Set several headers at once, each replacing same-named ones
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self.try_insert_header(name.as_ref(), value.as_ref());
        }
        self
    }

    /// Append a query parameter; repeated keys produce `?tag=a&tag=b`
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set query parameters, replacing values previously added on this
    /// builder for the same keys
    pub fn query_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in params {
            let key = key.into();
            self.query.retain(|(existing, _)| *existing != key);
            self.query.push((key, value.into()));
        }
        self
    }

    /// Set a raw body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = BodyKind::Bytes(body.into());
        self
    }

    /// Set a streaming body.
    ///
    /// A retry wrapper buffers the stream in full before the first attempt.
    pub fn body_stream<B>(mut self, body: B) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        self.body = BodyKind::Stream(body.map_err(Into::into).boxed_unsync());
        self
    }

    /// Serialize `value` as the JSON body.
    ///
    /// Sets `Content-Type: application/json` unless a content type was set on
    /// this request. A serialization failure is reported by `send()`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(encoded) => self.body = BodyKind::Json(Bytes::from(encoded)),
            Err(e) => self.error = self.error.or(Some(HttpError::Json(e))),
        }
        self
    }

    /// Serialize `value` as the XML body (`Content-Type: application/xml`
    /// unless set on this request)
    pub fn xml<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match quick_xml::se::to_string(value) {
            Ok(encoded) => self.body = BodyKind::Xml(Bytes::from(encoded)),
            Err(e) => self.error = self.error.or(Some(HttpError::XmlEncode(e))),
        }
        self
    }

    /// Serialize `value` as a URL-encoded form body
    /// (`Content-Type: application/x-www-form-urlencoded` unless set on this
    /// request)
    pub fn form<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_urlencoded::to_string(value) {
            Ok(encoded) => self.body = BodyKind::Form(Bytes::from(encoded)),
            Err(e) => self.error = self.error.or(Some(HttpError::FormEncode(e))),
        }
        self
    }

    /// Timeout for this request, replacing the client timeout.
    ///
    /// Covers every attempt, backoff sleeps and reading the response body.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run the request under `ctx`: cancelling it, or passing its deadline,
    /// aborts the request wherever it is
    pub fn context(mut self, ctx: &RequestContext) -> Self {
        self.context = Some(ctx.clone());
        self
    }

    /// Apply a [`RequestOption`]
    pub fn apply(self, option: RequestOption) -> Self {
        match option {
            RequestOption::Header(name, value) => self.header(&name, &value),
            RequestOption::Query(key, value) => self.query(key, value),
            RequestOption::Context(ctx) => self.context(&ctx),
        }
    }

    /// Apply every option in order
    pub fn apply_all(self, options: &[RequestOption]) -> Self {
        options
            .iter()
            .cloned()
            .fold(self, RequestBuilder::apply)
    }

    /// Final URL after base URL resolution and query merging
    #[must_use]
    pub fn build_url(&self) -> String {
        merge_query(&resolve_url(self.client.base_url(), &self.url), &self.query)
    }

    /// Send the request through the client's transport chain.
    ///
    /// Every status is returned as `Ok`; use
    /// [`HttpResponse::error_for_status`] to turn non-2xx into an error.
    ///
    /// # Errors
    ///
    /// Returns `HttpError` if:
    /// - building failed (invalid header, body serialization)
    /// - the final URL is not absolute
    /// - the chain failed (network, TLS, blocked domain, ...)
    /// - the timeout elapsed or the context was cancelled
    pub async fn send(mut self) -> Result<HttpResponse, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let url = self.build_url();
        let uri = parse_uri(&url)?;

        if !self.headers.contains_key(CONTENT_TYPE)
            && let Some(content_type) = self.body.content_type()
        {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }

        // Request headers replace same-named client defaults
        let mut headers = self.client.default_headers();
        headers.extend(self.headers);

        let mut request = Request::builder()
            .method(self.method)
            .uri(uri)
            .body(self.body.into_body())?;
        *request.headers_mut() = headers;

        let timeout = self.timeout.unwrap_or_else(|| self.client.timeout());
        let mut ctx = self.context.unwrap_or_default().child();
        if !timeout.is_zero() {
            ctx = ctx.with_timeout(timeout);
        }

        self.client.execute(request, ctx).await
    }
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn is_absolute_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Join `url` onto `base` unless it is already absolute
pub(crate) fn resolve_url(base: &str, url: &str) -> String {
    let base = base.trim();
    let url = url.trim();

    if is_absolute_url(url) || base.is_empty() {
        return url.to_owned();
    }

    let base = base.strip_suffix('/').unwrap_or(base);
    if url.is_empty() {
        base.to_owned()
    } else if url.starts_with('/') {
        format!("{base}{url}")
    } else {
        format!("{base}/{url}")
    }
}

/// Add `query` to the query string of `url`, keeping the existing pairs.
///
/// A URL that does not parse is returned unchanged.
pub(crate) fn merge_query(url: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return url.to_owned();
    }
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.query_pairs_mut().extend_pairs(query);
            parsed.into()
        }
        Err(e) => {
            tracing::debug!(url, error = %e, "URL does not parse; query parameters dropped");
            url.to_owned()
        }
    }
}

/// Parse the final URL, which must carry a scheme and a host
fn parse_uri(url: &str) -> Result<http::Uri, HttpError> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

    if uri.authority().is_none() {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }
    if uri.scheme().is_none() {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingScheme,
            reason: "missing scheme".to_owned(),
        });
    }
    Ok(uri)
}
