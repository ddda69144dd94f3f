use crate::body::{self, RequestBody, ResponseBody};
use crate::config::{RetryConfig, RetryOutcome};
use crate::context::RequestContext;
use crate::error::HttpError;
use bytes::Bytes;
use http::{Request, Response};
use http_body::Body as _;
use http_body_util::BodyExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service, ServiceExt};

/// Tower layer that retries attempts with linear backoff
///
/// The request body is buffered once and replayed in full on every attempt.
/// After each attempt the configured predicate decides whether to go again;
/// the last attempt's outcome is returned as is, so a final 5xx arrives as
/// `Ok(Response)`.
///
/// Backoff sleeps are interrupted by the [`RequestContext`] found in the
/// request extensions, if any.
#[derive(Clone, Debug)]
pub struct RetryLayer {
    config: RetryConfig,
}

impl RetryLayer {
    /// Create a new `RetryLayer` with the specified configuration
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            config: self.config.clone(),
        }
    }
}

/// Service that replays a buffered request until the predicate is satisfied
/// or the retries run out
#[derive(Clone, Debug)]
pub struct RetryService<S> {
    inner: S,
    config: RetryConfig,
}

impl<S, F> Service<Request<RequestBody>> for RetryService<S>
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
    type Future = Pin<Box<dyn Future<Output = RetryOutcome> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<RequestBody>) -> Self::Future {
        // Swap so we consume the instance that was poll_ready'd,
        // leaving a fresh clone for the next poll_ready cycle.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let config = self.config.clone();

        let (parts, body) = req.into_parts();
        let ctx = parts.extensions.get::<RequestContext>().cloned();
        let parts = Arc::new(parts);

        Box::pin(async move {
            let payload = if body.is_end_stream() {
                Bytes::new()
            } else {
                buffer_body(body).await
            };

            let mut attempt = 0usize;
            loop {
                let req = Request::from_parts((*parts).clone(), body::full(payload.clone()));

                let mut svc = inner.clone();
                let outcome = match svc.ready().await {
                    Ok(svc) => svc.call(req).await,
                    Err(err) => Err(err),
                };

                if attempt >= config.max_retries || !(config.retry_if)(&outcome) {
                    return outcome;
                }

                let delay = config.delay_for(attempt);
                match &outcome {
                    Ok(resp) => tracing::debug!(
                        attempt = attempt + 1,
                        max_retries = config.max_retries,
                        status = resp.status().as_u16(),
                        method = %parts.method,
                        host = parts.uri.host().unwrap_or_default(),
                        backoff_ms = delay.as_millis(),
                        "Retrying request after status code"
                    ),
                    Err(err) => tracing::debug!(
                        attempt = attempt + 1,
                        max_retries = config.max_retries,
                        error = %err,
                        method = %parts.method,
                        host = parts.uri.host().unwrap_or_default(),
                        backoff_ms = delay.as_millis(),
                        "Retrying request after error"
                    ),
                }

                if let Ok(resp) = outcome {
                    drain_response_body(resp, config.retry_response_drain_limit).await;
                }

                if let Some(ctx) = &ctx {
                    tokio::select! {
                        err = ctx.done() => return Err(err),
                        () = tokio::time::sleep(delay) => {}
                    }
                } else {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        })
    }
}

/// Read the whole request body so it can be replayed.
///
/// A body that cannot be read is replaced by an empty one.
async fn buffer_body(body: RequestBody) -> Bytes {
    match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::debug!(error = %e, "Failed to buffer request body; sending without body");
            Bytes::new()
        }
    }
}

/// Drain a discarded response up to `limit` bytes so the connection can be
/// reused. Errors only cost the connection and are logged.
async fn drain_response_body(response: Response<ResponseBody>, limit: usize) {
    let mut body = std::pin::pin!(response.into_body());
    let mut drained = 0usize;

    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Some(chunk) = frame.data_ref() {
                    drained += chunk.len();
                    if drained >= limit {
                        break;
                    }
                }
            }
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    "Failed to drain response body before retry; connection may not be reused"
                );
                break;
            }
        }
    }
}
