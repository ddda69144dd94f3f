use crate::error::HttpError;
use http::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::{Layer, Service};

/// Destination for the line-oriented output of [`LoggingLayer`] and
/// [`DebugLayer`](crate::DebugLayer).
///
/// Any `Fn(&str) + Send + Sync` closure is a sink:
///
/// ```ignore
/// let lines = Arc::new(Mutex::new(Vec::new()));
/// let captured = lines.clone();
/// let client = HttpClient::builder()
///     .logger(move |line: &str| captured.lock().unwrap().push(line.to_owned()))
///     .build()?;
/// ```
pub trait LogSink: Send + Sync {
    /// Record one line
    fn log(&self, line: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, line: &str) {
        self(line);
    }
}

/// Sink that emits each line as a `tracing` event at INFO level
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, line: &str) {
        tracing::info!(target: "httpc", "{line}");
    }
}

/// Shared, type-erased sink
pub type SharedSink = Arc<dyn LogSink>;

/// Render a duration the way log lines show it, e.g. `12.345ms`
pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    format!(
        "{}.{:03}ms",
        elapsed.as_millis(),
        elapsed.subsec_micros() % 1000
    )
}

/// Tower layer that logs one line per request and one per outcome:
///
/// ```text
/// → GET https://api.example.com/users
/// ← 200 (took 12.345ms)
/// ← Error: Transport error: connection refused (took 3.001ms)
/// ```
#[derive(Clone)]
pub struct LoggingLayer {
    sink: SharedSink,
}

impl LoggingLayer {
    /// Create a layer writing to `sink`
    #[must_use]
    pub fn new(sink: SharedSink) -> Self {
        Self { sink }
    }
}

impl Default for LoggingLayer {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl std::fmt::Debug for LoggingLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingLayer").finish_non_exhaustive()
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService {
            inner,
            sink: Arc::clone(&self.sink),
        }
    }
}

/// Service that records request and outcome lines
#[derive(Clone)]
pub struct LoggingService<S> {
    inner: S,
    sink: SharedSink,
}

impl<S, F, ReqBody, ResBody> Service<Request<ReqBody>> for LoggingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>, Error = HttpError, Future = F>
        + Clone
        + Send
        + 'static,
    F: Future<Output = Result<Response<ResBody>, HttpError>> + Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, HttpError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let sink = Arc::clone(&self.sink);

        Box::pin(async move {
            let start = Instant::now();
            sink.log(&format!("\u{2192} {} {}", req.method(), req.uri()));

            let result = inner.call(req).await;
            let took = format_elapsed(start.elapsed());
            match &result {
                Ok(resp) => sink.log(&format!("\u{2190} {} (took {took})", resp.status().as_u16())),
                Err(err) => sink.log(&format!("\u{2190} Error: {err} (took {took})")),
            }
            result
        })
    }
}
