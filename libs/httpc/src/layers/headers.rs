use crate::config::{DEFAULT_ACCEPT, DEFAULT_ACCEPT_ENCODING, DEFAULT_USER_AGENT};
use crate::error::HttpError;
use http::header::{ACCEPT, ACCEPT_ENCODING, USER_AGENT};
use http::{HeaderMap, HeaderValue, Request, Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that fills `User-Agent`, `Accept` and `Accept-Encoding`
/// when the request does not carry them yet.
///
/// Sits at the bottom of every chain, so values set by the caller, the client
/// defaults or any wrapper above it always win.
#[derive(Clone, Debug)]
pub struct DefaultHeadersLayer {
    defaults: HeaderMap,
}

impl DefaultHeadersLayer {
    /// Layer with the built-in defaults
    #[must_use]
    pub fn new() -> Self {
        let mut defaults = HeaderMap::with_capacity(3);
        defaults.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        defaults.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        defaults.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_static(DEFAULT_ACCEPT_ENCODING),
        );
        Self { defaults }
    }
}

impl Default for DefaultHeadersLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            defaults: self.defaults.clone(),
        }
    }
}

/// Service that fills missing default headers
#[derive(Clone, Debug)]
pub struct DefaultHeadersService<S> {
    inner: S,
    defaults: HeaderMap,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DefaultHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let headers = req.headers_mut();
        for (name, value) in &self.defaults {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        self.inner.call(req)
    }
}

/// Tower layer that sets a fixed group of headers on every request,
/// replacing same-named headers already present.
///
/// # Example
///
/// ```ignore
/// let client = HttpClient::builder()
///     .inject_headers([("x-tenant", "acme")])
///     .build()?;
/// ```
#[derive(Clone, Debug)]
pub struct HeaderLayer {
    headers: HeaderMap,
}

impl HeaderLayer {
    /// Create a layer from an already validated header map
    #[must_use]
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Create a layer from name/value string pairs
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderName` or `HttpError::InvalidHeaderValue`
    /// for the first pair that is not a valid header.
    pub fn try_from_pairs<I, K, V>(pairs: I) -> Result<Self, HttpError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            let name = http::header::HeaderName::try_from(name.as_ref())?;
            let value = HeaderValue::try_from(value.as_ref())?;
            headers.insert(name, value);
        }
        Ok(Self { headers })
    }
}

impl<S> Layer<S> for HeaderLayer {
    type Service = HeaderService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HeaderService {
            inner,
            headers: self.headers.clone(),
        }
    }
}

/// Service that overwrites request headers with a fixed set
#[derive(Clone, Debug)]
pub struct HeaderService<S> {
    inner: S,
    headers: HeaderMap,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for HeaderService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let headers = req.headers_mut();
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use http_body_util::Full;
    use tower::ServiceExt;

    /// Echoes request headers back as response headers
    #[derive(Clone)]
    struct EchoHeaders;

    impl Service<Request<Full<Bytes>>> for EchoHeaders {
        type Response = Response<Full<Bytes>>;
        type Error = HttpError;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            let mut resp = Response::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::new()))
                .unwrap();
            *resp.headers_mut() = req.headers().clone();
            std::future::ready(Ok(resp))
        }
    }

    fn request() -> http::request::Builder {
        Request::builder().method(Method::GET).uri("http://example.com")
    }

    #[tokio::test]
    async fn test_defaults_added_when_absent() {
        let svc = DefaultHeadersLayer::new().layer(EchoHeaders);
        let req = request().body(Full::new(Bytes::new())).unwrap();

        let resp = svc.oneshot(req).await.unwrap();
        assert_eq!(resp.headers()[USER_AGENT], DEFAULT_USER_AGENT);
        assert_eq!(resp.headers()[ACCEPT], "*/*");
        assert_eq!(resp.headers()[ACCEPT_ENCODING], "gzip");
    }

    #[tokio::test]
    async fn test_defaults_do_not_overwrite() {
        let svc = DefaultHeadersLayer::new().layer(EchoHeaders);
        let req = request()
            .header(USER_AGENT, "custom-agent/2.0")
            .header(ACCEPT, "application/json")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let resp = svc.oneshot(req).await.unwrap();
        assert_eq!(resp.headers()[USER_AGENT], "custom-agent/2.0");
        assert_eq!(resp.headers()[ACCEPT], "application/json");
        assert_eq!(resp.headers()[ACCEPT_ENCODING], "gzip");
    }

    #[tokio::test]
    async fn test_header_layer_overwrites() {
        let layer = HeaderLayer::try_from_pairs([("x-tenant", "acme"), ("accept", "text/csv")])
            .unwrap();
        let svc = layer.layer(EchoHeaders);
        let req = request()
            .header(ACCEPT, "application/json")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let resp = svc.oneshot(req).await.unwrap();
        assert_eq!(resp.headers()["x-tenant"], "acme");
        assert_eq!(resp.headers().get_all(ACCEPT).iter().count(), 1);
        assert_eq!(resp.headers()[ACCEPT], "text/csv");
    }

    #[test]
    fn test_header_layer_invalid_value() {
        let result = HeaderLayer::try_from_pairs([("x-bad", "invalid\x00value")]);
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));

        let result = HeaderLayer::try_from_pairs([("bad header", "v")]);
        assert!(matches!(result, Err(HttpError::InvalidHeaderName(_))));
    }
}
