use crate::body::RequestBody;
use crate::builder::HttpClientBuilder;
use crate::config::HttpClientConfig;
use crate::context::RequestContext;
use crate::error::HttpError;
use crate::request::RequestBuilder;
use crate::response::HttpResponse;
use crate::transport::Transport;
use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, Method, Request};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tower::{Service, ServiceExt};

struct ClientInner {
    base_url: String,
    default_headers: RwLock<HeaderMap>,
    timeout: Duration,
    max_body_size: usize,
    transport: Transport,
}

/// HTTP client over a fixed tower middleware chain
///
/// Use [`HttpClientBuilder`] to configure the base URL, default headers,
/// timeout and the wrappers (auth, retry, logging, ...) the chain is built
/// from. The chain cannot change after construction; only the default
/// headers can, through [`set_default_header`](Self::set_default_header).
///
/// # Thread Safety
///
/// `HttpClient` is `Clone + Send + Sync`. Cloning is cheap (one `Arc`) and
/// clones share the connection pool. Each request runs on the caller's task,
/// so concurrent callers never wait on each other inside the client.
///
/// # Example
///
/// ```ignore
/// let client = HttpClient::builder()
///     .base_url("https://api.example.com")
///     .bearer_auth(token)
///     .retry(RetryConfig::new(3, Duration::from_millis(200)))
///     .build()?;
///
/// let mut resp = client.get("/users/42").send().await?;
/// let user: User = resp.json().await?;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    /// Create a builder for configuring the HTTP client
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    pub(crate) fn from_parts(
        config: &HttpClientConfig,
        default_headers: HeaderMap,
        transport: Transport,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                base_url: config.base_url.clone(),
                default_headers: RwLock::new(default_headers),
                timeout: config.timeout,
                max_body_size: config.max_body_size,
                transport,
            }),
        }
    }

    /// Base URL relative request URLs are resolved against
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Client-wide request timeout (`Duration::ZERO` when disabled)
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Snapshot of the default headers sent with every request
    #[must_use]
    pub fn default_headers(&self) -> HeaderMap {
        self.inner.default_headers.read().clone()
    }

    /// Set a default header for every later request of this client and its
    /// clones, replacing a same-named one
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderName` or `HttpError::InvalidHeaderValue`
    /// if the pair is not a valid header.
    pub fn set_default_header(&self, name: &str, value: &str) -> Result<(), HttpError> {
        let name = HeaderName::try_from(name)?;
        let value = HeaderValue::try_from(value)?;
        self.inner.default_headers.write().insert(name, value);
        Ok(())
    }

    /// Create a request builder for any method
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(self.clone(), method, url)
    }

    /// Create a GET request builder
    ///
    /// `url` is either absolute or a path joined onto the base URL.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut resp = client
    ///     .get("/search")
    ///     .query("q", "rust")
    ///     .query("page", "1")
    ///     .send()
    ///     .await?;
    /// ```
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Create a POST request builder
    ///
    /// # Example
    ///
    /// ```ignore
    /// let resp = client
    ///     .post("/users")
    ///     .json(&NewUser { name: "Alice" })
    ///     .send()
    ///     .await?;
    /// ```
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Create a PUT request builder
    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Create a PATCH request builder
    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    /// Create a DELETE request builder
    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Create a HEAD request builder
    pub fn head(&self, url: &str) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    /// GET under `ctx`
    pub fn get_with_context(&self, ctx: &RequestContext, url: &str) -> RequestBuilder {
        self.get(url).context(ctx)
    }

    /// POST under `ctx`
    pub fn post_with_context(&self, ctx: &RequestContext, url: &str) -> RequestBuilder {
        self.post(url).context(ctx)
    }

    /// PUT under `ctx`
    pub fn put_with_context(&self, ctx: &RequestContext, url: &str) -> RequestBuilder {
        self.put(url).context(ctx)
    }

    /// PATCH under `ctx`
    pub fn patch_with_context(&self, ctx: &RequestContext, url: &str) -> RequestBuilder {
        self.patch(url).context(ctx)
    }

    /// DELETE under `ctx`
    pub fn delete_with_context(&self, ctx: &RequestContext, url: &str) -> RequestBuilder {
        self.delete(url).context(ctx)
    }

    /// Push a prepared request through the chain under `ctx`
    pub(crate) async fn execute(
        &self,
        mut request: Request<RequestBody>,
        ctx: RequestContext,
    ) -> Result<HttpResponse, HttpError> {
        request.extensions_mut().insert(ctx.clone());
        let mut transport = self.inner.transport.clone();
        let response = ctx
            .run(async move { transport.ready().await?.call(request).await })
            .await?;
        Ok(HttpResponse::new(response, self.inner.max_body_size, ctx))
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.inner.base_url)
            .field("timeout", &self.inner.timeout)
            .field("max_body_size", &self.inner.max_body_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::body::tests::gzip_compress;
    use crate::config::RetryConfig;
    use crate::layers::{DebugLayer, REDACTED};
    use httpmock::prelude::*;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};

    fn test_client(server: &MockServer) -> HttpClientBuilder {
        HttpClientBuilder::with_config(HttpClientConfig::for_testing()).base_url(server.base_url())
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Item {
        id: u32,
        name: String,
    }

    #[test]
    fn test_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<HttpClient>();
    }

    #[tokio::test]
    async fn test_get_resolves_against_base_url() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/items")
                .query_param("page", "2")
                .query_param("tag", "a")
                .header("x-env", "test");
            then.status(200).body("[]");
        });

        let client = test_client(&server).header("x-env", "test").build().unwrap();
        let mut resp = client
            .get("api/items")
            .query("page", "2")
            .query("tag", "a")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "[]");
        mock.assert();
    }

    #[tokio::test]
    async fn test_request_header_overrides_default() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/").header("accept", "text/csv");
            then.status(200);
        });

        let client = test_client(&server)
            .accept("application/json")
            .build()
            .unwrap();
        client
            .get("/")
            .header("Accept", "text/csv")
            .send()
            .await
            .unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn test_set_default_header_visible_to_clones() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/").header("x-tenant", "acme");
            then.status(204);
        });

        let client = test_client(&server).build().unwrap();
        let clone = client.clone();
        client.set_default_header("x-tenant", "acme").unwrap();
        assert!(client.set_default_header("bad name", "v").is_err());

        clone.get("/").send().await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn test_json_body_sets_content_type_unless_explicit() {
        let server = MockServer::start();
        let json = server.mock(|when, then| {
            when.method(POST)
                .path("/items")
                .header("content-type", "application/json")
                .json_body(serde_json::json!({"id": 1, "name": "pen"}));
            then.status(201);
        });
        let custom = server.mock(|when, then| {
            when.method(PUT)
                .path("/items/1")
                .header("content-type", "application/vnd.item+json");
            then.status(200);
        });

        let client = test_client(&server).build().unwrap();
        let item = Item {
            id: 1,
            name: "pen".to_owned(),
        };
        let resp = client.post("/items").json(&item).send().await.unwrap();
        assert_eq!(resp.status(), 201);

        client
            .put("/items/1")
            .header("content-type", "application/vnd.item+json")
            .json(&item)
            .send()
            .await
            .unwrap();

        json.assert();
        custom.assert();
    }

    #[tokio::test]
    async fn test_form_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/login")
                .header("content-type", "application/x-www-form-urlencoded")
                .body("user=ann&remember=true");
            then.status(200);
        });

        let client = test_client(&server).build().unwrap();
        client
            .post("/login")
            .form(&[("user", "ann"), ("remember", "true")])
            .send()
            .await
            .unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn test_gzip_response_cached() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/data");
            then.status(200)
                .header("content-encoding", "gzip")
                .body(gzip_compress(b"{\"id\":9,\"name\":\"zip\"}"));
        });

        let client = test_client(&server).build().unwrap();
        let mut resp = client.get("/data").send().await.unwrap();
        let item: Item = resp.json().await.unwrap();
        assert_eq!(item.id, 9);
        assert_eq!(resp.text().await.unwrap(), "{\"id\":9,\"name\":\"zip\"}");
    }

    #[tokio::test]
    async fn test_non_2xx_is_ok_until_checked() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(DELETE).path("/items/1");
            then.status(404).body("gone");
        });

        let client = test_client(&server).build().unwrap();
        let resp = client.delete("/items/1").send().await.unwrap();
        assert!(!resp.is_success());
        let err = resp.error_for_status().unwrap_err();
        assert!(matches!(err, HttpError::HttpStatus(ref s) if s.status == 404));
    }

    #[tokio::test]
    async fn test_blocked_domain_never_hits_server() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.any_request();
            then.status(200);
        });

        let client = test_client(&server)
            .blocked_domains(["127.0.0.1"])
            .build()
            .unwrap();
        let err = client.get("/anything").send().await.unwrap_err();

        assert!(matches!(err, HttpError::BlockedDomain { ref domain } if domain == "127.0.0.1"));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_retry_through_client() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503);
        });

        let client = test_client(&server)
            .retry(RetryConfig::new(2, Duration::from_millis(1)))
            .build()
            .unwrap();
        let resp = client.get("/flaky").send().await.unwrap();

        assert_eq!(resp.status(), 503);
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_debug_masks_credentials() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/secure");
            then.status(200).body("ok");
        });

        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let captured = Arc::clone(&lines);
        let client = test_client(&server)
            .api_key("super-secret")
            .layer(DebugLayer::new(true).with_sink(Arc::new(move |line: &str| {
                captured.lock().push(line.to_owned());
            })))
            .bearer_auth("tok-secret")
            .build()
            .unwrap();
        client.get("/secure").send().await.unwrap();

        let output = lines.lock().join("\n");
        assert!(!output.contains("super-secret"), "{output}");
        assert!(!output.contains("tok-secret"), "{output}");
        assert!(output.contains(REDACTED));
    }

    #[tokio::test]
    async fn test_timeout_elapses() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_millis(500));
        });

        let client = test_client(&server)
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let err = client.get("/slow").send().await.unwrap_err();
        assert!(matches!(err, HttpError::Timeout(_)), "got {err:?}");

        // A per-request timeout replaces the client one
        let resp = client
            .get("/slow")
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(5));
        });

        let client = test_client(&server).build().unwrap();
        let ctx = RequestContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let err = client
            .get_with_context(&ctx, "/slow")
            .send()
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Cancelled), "got {err:?}");
    }

    fn assert_send<T: Send>(value: T) -> T {
        value
    }

    #[test]
    fn test_send_and_read_futures_are_send() {
        let client = HttpClient::new().unwrap();
        drop(assert_send(client.get("http://example.test/").send()));
        drop(assert_send(
            client
                .post("http://example.test/")
                .json(&serde_json::json!({ "id": 1 }))
                .send(),
        ));
        drop(assert_send(client.get_json::<serde_json::Value>(
            "http://example.test/",
            &[],
        )));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_client() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/ping");
            then.status(200).body("pong");
        });

        let client = test_client(&server).build().unwrap();
        let mut handles = Vec::new();
        for _ in 0..50 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                let mut resp = client.get("/ping").send().await?;
                resp.text().await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "pong");
        }
        assert_eq!(mock.calls(), 50);
    }

    #[tokio::test]
    async fn test_invalid_url_without_base() {
        let client = HttpClient::new().unwrap();
        let err = client.get("/relative").send().await.unwrap_err();
        assert!(matches!(err, HttpError::InvalidUri { .. }), "got {err:?}");
    }
}
