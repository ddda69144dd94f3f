use crate::body::{self, BoxError, RequestBody, ResponseBody};
use crate::error::HttpError;
use crate::layers::logging::{SharedSink, TracingSink, format_elapsed};
use bytes::Bytes;
use http::{HeaderMap, Request, Response};
use http_body::{Body as _, Frame, SizeHint};
use http_body_util::BodyExt;
use std::future::Future;
use std::io::Read;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Instant;
use tower::{Layer, Service};

/// Placeholder written instead of a sensitive header value
pub const REDACTED: &str = "***REDACTED***";

/// Default cap on the body bytes shown per message (1 MiB)
pub const DEFAULT_MAX_BODY_LOG_SIZE: usize = 1024 * 1024;

/// Header name fragments whose values are never logged (case-insensitive)
const SENSITIVE_HEADER_PATTERNS: &[&str] = &["authorization", "api-key", "x-api-key", "cookie"];

/// Whether a header name matches one of the sensitive fragments
#[must_use]
pub fn is_sensitive_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    SENSITIVE_HEADER_PATTERNS
        .iter()
        .any(|pattern| name.contains(pattern))
}

/// Tower layer that traces full request and response detail.
///
/// When enabled, logs method and URL, headers (values of sensitive headers
/// replaced by [`REDACTED`]), the request body, then status, duration,
/// response headers and the response body. Bodies are shown capped at
/// `max_body_log_size` bytes and gzip-decoded when `Content-Encoding: gzip`;
/// the bodies passed on are always the complete originals.
///
/// The request body is read before the request is sent. The response body is
/// never read ahead: its view is logged as the caller consumes it, once the
/// cap is reached, the stream ends, or the body is dropped.
///
/// When disabled the layer is a pure passthrough.
#[derive(Clone)]
pub struct DebugLayer {
    enabled: bool,
    log_body: bool,
    max_body_log_size: usize,
    sink: SharedSink,
}

impl DebugLayer {
    /// Create a layer writing to `tracing`
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            log_body: true,
            max_body_log_size: DEFAULT_MAX_BODY_LOG_SIZE,
            sink: Arc::new(TracingSink),
        }
    }

    /// Write to `sink` instead of `tracing`
    #[must_use]
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Toggle body logging (default: on)
    #[must_use]
    pub fn log_body(mut self, log_body: bool) -> Self {
        self.log_body = log_body;
        self
    }

    /// Cap on body bytes shown per message
    #[must_use]
    pub fn max_body_log_size(mut self, size: usize) -> Self {
        self.max_body_log_size = size;
        self
    }

    fn log_headers(&self, title: &str, headers: &HeaderMap) {
        if headers.is_empty() {
            return;
        }
        self.sink.log(&format!("{title}:"));
        for (name, value) in headers {
            let shown = if value.is_sensitive() || is_sensitive_header(name.as_str()) {
                REDACTED
            } else {
                value.to_str().unwrap_or("<non-ascii value>")
            };
            self.sink.log(&format!("\t{name}: {shown}"));
        }
    }

    fn log_body_view(&self, title: &str, gzip: bool, raw: &[u8]) {
        if raw.is_empty() {
            return;
        }
        let view = self.body_view(gzip, raw);
        self.sink
            .log(&format!("{title}:\n{}", String::from_utf8_lossy(&view)));
    }

    /// Capped, gzip-decoded view of `raw`. A truncated gzip prefix shows what
    /// decoded before the cut; anything undecodable falls back to the raw
    /// bytes.
    fn body_view(&self, gzip: bool, raw: &[u8]) -> Vec<u8> {
        let cap = self.max_body_log_size;
        if gzip {
            let limit = u64::try_from(cap).unwrap_or(u64::MAX);
            let mut decoded = Vec::new();
            match flate2::read::GzDecoder::new(raw)
                .take(limit)
                .read_to_end(&mut decoded)
            {
                Err(e) if decoded.is_empty() => {
                    self.sink.log(&format!("Failed to decode gzip body: {e}"));
                }
                _ => return decoded,
            }
        }
        raw[..raw.len().min(cap)].to_vec()
    }

    /// Log the request line, headers and body. A body that cannot be read is
    /// logged as a failure and replaced by an empty one.
    async fn trace_request(&self, req: Request<RequestBody>) -> Request<RequestBody> {
        self.sink
            .log(&format!("\u{2192} {} {}", req.method(), req.uri()));
        self.log_headers("Request Headers", req.headers());

        if !self.log_body || req.body().is_end_stream() {
            return req;
        }

        let (parts, body) = req.into_parts();
        let raw = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                self.sink.log(&format!("Failed to read request body: {e}"));
                return Request::from_parts(parts, body::empty());
            }
        };
        self.log_body_view("Request Body", body::is_gzip_encoded(&parts.headers), &raw);
        Request::from_parts(parts, body::full(raw))
    }

    fn trace_response(
        layer: &Arc<Self>,
        resp: Response<ResponseBody>,
        took: &str,
    ) -> Response<ResponseBody> {
        let status = resp.status();
        layer.sink.log(&format!(
            "\u{2190} {} {} (took {took})",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        ));
        layer.log_headers("Response Headers", resp.headers());

        if !layer.log_body || resp.body().is_end_stream() {
            return resp;
        }

        let (parts, inner) = resp.into_parts();
        let logged = LoggedBody {
            inner,
            layer: Arc::clone(layer),
            gzip: body::is_gzip_encoded(&parts.headers),
            seen: Vec::new(),
            logged: false,
        };
        Response::from_parts(parts, ResponseBody::new(logged))
    }
}

/// Response body that records what passes through it, up to the cap, and
/// logs that view exactly once
struct LoggedBody {
    inner: ResponseBody,
    layer: Arc<DebugLayer>,
    gzip: bool,
    seen: Vec<u8>,
    logged: bool,
}

impl LoggedBody {
    fn flush(&mut self) {
        if std::mem::replace(&mut self.logged, true) {
            return;
        }
        self.layer
            .log_body_view("Response Body", self.gzip, &self.seen);
    }
}

impl http_body::Body for LoggedBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let this = self.get_mut();
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));
        match &frame {
            Some(Ok(frame)) => {
                if let Some(chunk) = frame.data_ref()
                    && !this.logged
                {
                    let cap = this.layer.max_body_log_size;
                    let room = cap.saturating_sub(this.seen.len());
                    this.seen
                        .extend_from_slice(&chunk[..chunk.len().min(room)]);
                    if this.seen.len() >= cap {
                        this.flush();
                    }
                }
            }
            Some(Err(_)) | None => this.flush(),
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for LoggedBody {
    fn drop(&mut self) {
        self.flush();
    }
}

impl std::fmt::Debug for DebugLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugLayer")
            .field("enabled", &self.enabled)
            .field("log_body", &self.log_body)
            .field("max_body_log_size", &self.max_body_log_size)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for DebugLayer {
    type Service = DebugService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DebugService {
            inner,
            layer: Arc::new(self.clone()),
        }
    }
}

/// Service created by [`DebugLayer`]
#[derive(Clone)]
pub struct DebugService<S> {
    inner: S,
    layer: Arc<DebugLayer>,
}

impl<S, F> Service<Request<RequestBody>> for DebugService<S>
where
    S: Service<
            Request<RequestBody>,
            Response = Response<ResponseBody>,
            Error = HttpError,
            Future = F,
        > + Clone
        + Send
        + 'static,
    F: Future<Output = Result<Response<ResponseBody>, HttpError>> + Send + 'static,
{
    type Response = Response<ResponseBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<RequestBody>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if !self.layer.enabled {
            return Box::pin(async move { inner.call(req).await });
        }

        let layer = Arc::clone(&self.layer);
        Box::pin(async move {
            let req = layer.trace_request(req).await;

            let start = Instant::now();
            let result = inner.call(req).await;
            let took = format_elapsed(start.elapsed());

            match result {
                Ok(resp) => Ok(DebugLayer::trace_response(&layer, resp, &took)),
                Err(err) => {
                    layer
                        .sink
                        .log(&format!("\u{2717} Error: {err} (took {took})"));
                    Err(err)
                }
            }
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::body::tests::gzip_compress;
    use http::StatusCode;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Echoes the request body back, gzip-encoded when asked to
    #[derive(Clone)]
    struct EchoService {
        gzip: bool,
    }

    impl Service<Request<RequestBody>> for EchoService {
        type Response = Response<ResponseBody>;
        type Error = HttpError;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<RequestBody>) -> Self::Future {
            let gzip = self.gzip;
            Box::pin(async move {
                let raw = req.into_body().collect().await.unwrap().to_bytes();
                let mut builder = Response::builder()
                    .status(StatusCode::OK)
                    .header("set-cookie", "session=s3cr3t");
                let payload = if gzip {
                    builder = builder.header("content-encoding", "gzip");
                    Bytes::from(gzip_compress(&raw))
                } else {
                    raw
                };
                Ok(builder.body(body::full_response(payload)).unwrap())
            })
        }
    }

    fn capture() -> (SharedSink, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        let sink: SharedSink = Arc::new(move |line: &str| captured.lock().push(line.to_owned()));
        (sink, lines)
    }

    fn request(body: &'static str) -> Request<RequestBody> {
        Request::builder()
            .method("POST")
            .uri("http://example.com/login")
            .header("authorization", "Bearer super-secret-token")
            .header("X-Api-Key", "key-123")
            .header("content-type", "application/json")
            .body(body::full(body))
            .unwrap()
    }

    #[test]
    fn test_sensitive_header_patterns() {
        assert!(is_sensitive_header("Authorization"));
        assert!(is_sensitive_header("proxy-authorization"));
        assert!(is_sensitive_header("X-API-KEY"));
        assert!(is_sensitive_header("set-cookie"));
        assert!(!is_sensitive_header("content-type"));
    }

    #[tokio::test]
    async fn test_sensitive_values_masked() {
        let (sink, lines) = capture();
        let svc = DebugLayer::new(true)
            .with_sink(sink)
            .layer(EchoService { gzip: false });

        let resp = svc.oneshot(request(r#"{"user":"alice"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let joined = lines.lock().join("\n");
        assert!(!joined.contains("super-secret-token"));
        assert!(!joined.contains("key-123"));
        assert!(!joined.contains("s3cr3t"));
        assert!(joined.contains(&format!("authorization: {REDACTED}")));
        assert!(joined.contains("content-type: application/json"));
        assert!(joined.contains("\u{2192} POST http://example.com/login"));
        assert!(joined.contains("\u{2190} 200 OK (took "));
    }

    #[tokio::test]
    async fn test_bodies_logged_and_restored() {
        let (sink, lines) = capture();
        let svc = DebugLayer::new(true)
            .with_sink(sink)
            .layer(EchoService { gzip: true });

        let resp = svc.oneshot(request("hello body")).await.unwrap();

        // Response body is passed on untouched (still compressed)
        let raw = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(
            &body::decode_gzip(&raw, usize::MAX).unwrap()[..],
            b"hello body"
        );

        let lines = lines.lock();
        assert!(lines.contains(&"Request Body:\nhello body".to_owned()));
        // Logged view is decoded
        assert!(lines.contains(&"Response Body:\nhello body".to_owned()));
    }

    #[tokio::test]
    async fn test_body_view_capped() {
        let (sink, lines) = capture();
        let svc = DebugLayer::new(true)
            .with_sink(sink)
            .max_body_log_size(5)
            .layer(EchoService { gzip: false });

        let resp = svc.oneshot(request("0123456789")).await.unwrap();
        let raw = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&raw[..], b"0123456789");

        let lines = lines.lock();
        assert!(lines.contains(&"Request Body:\n01234".to_owned()));
        assert!(lines.contains(&"Response Body:\n01234".to_owned()));
    }

    /// Sends one chunk, then keeps the stream open
    struct OpenStream {
        first: Option<Bytes>,
    }

    impl http_body::Body for OpenStream {
        type Data = Bytes;
        type Error = BoxError;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
            match self.first.take() {
                Some(chunk) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
                None => Poll::Pending,
            }
        }
    }

    #[tokio::test]
    async fn test_open_response_stream_not_awaited() {
        let (sink, lines) = capture();
        let streaming = tower::service_fn(|_req: Request<RequestBody>| async {
            let stream = OpenStream {
                first: Some(Bytes::from_static(b"data: tick")),
            };
            Ok::<_, HttpError>(Response::new(ResponseBody::new(stream)))
        });
        let svc = DebugLayer::new(true).with_sink(sink).layer(streaming);

        let resp = tokio::time::timeout(Duration::from_secs(1), svc.oneshot(request("")))
            .await
            .expect("response must not wait for the stream to end")
            .unwrap();
        assert!(!lines.lock().iter().any(|l| l.starts_with("Response Body")));

        let mut body = resp.into_body();
        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"data: tick"));

        // Whatever was read is logged once the body goes away
        drop(body);
        assert!(lines.lock().contains(&"Response Body:\ndata: tick".to_owned()));
    }

    /// Request body that fails on the first read
    struct BrokenBody;

    impl http_body::Body for BrokenBody {
        type Data = Bytes;
        type Error = BoxError;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
            Poll::Ready(Some(Err("disk read failed".into())))
        }
    }

    #[tokio::test]
    async fn test_unreadable_request_body_sent_empty() {
        let (sink, lines) = capture();
        let svc = DebugLayer::new(true)
            .with_sink(sink)
            .layer(EchoService { gzip: false });

        let req = Request::builder()
            .method("POST")
            .uri("http://example.com/upload")
            .body(BrokenBody.boxed_unsync())
            .unwrap();
        let resp = svc.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let echoed = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(echoed.is_empty());
        assert!(
            lines
                .lock()
                .iter()
                .any(|l| l.starts_with("Failed to read request body: disk read failed"))
        );
    }

    #[tokio::test]
    async fn test_disabled_is_passthrough() {
        let (sink, lines) = capture();
        let svc = DebugLayer::new(false)
            .with_sink(sink)
            .layer(EchoService { gzip: false });

        let resp = svc.oneshot(request("quiet")).await.unwrap();
        let raw = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&raw[..], b"quiet");
        assert!(lines.lock().is_empty());
    }
}
