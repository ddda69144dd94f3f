use crate::error::HttpError;
use http::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that rejects requests whose host contains a blocked substring.
///
/// Matching is a plain substring test against the request host, so
/// `"example.com"` also blocks `"api.example.com"` and `"notexample.com"`.
/// A rejected request never reaches the inner service.
#[derive(Clone, Debug)]
pub struct BlocklistLayer {
    blocked: Arc<[String]>,
}

impl BlocklistLayer {
    /// Create a layer blocking every host that contains one of `domains`.
    ///
    /// Empty entries are ignored, since they would match every host.
    #[must_use]
    pub fn new<I, D>(domains: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        let blocked: Vec<String> = domains
            .into_iter()
            .map(Into::into)
            .filter(|d: &String| !d.is_empty())
            .collect();
        Self {
            blocked: blocked.into(),
        }
    }
}

impl<S> Layer<S> for BlocklistLayer {
    type Service = BlocklistService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BlocklistService {
            inner,
            blocked: Arc::clone(&self.blocked),
        }
    }
}

/// Service that fails fast with [`HttpError::BlockedDomain`]
#[derive(Clone, Debug)]
pub struct BlocklistService<S> {
    inner: S,
    blocked: Arc<[String]>,
}

impl<S> BlocklistService<S> {
    fn matching_entry(&self, host: &str) -> Option<&str> {
        self.blocked
            .iter()
            .find(|blocked| host.contains(blocked.as_str()))
            .map(String::as_str)
    }
}

impl<S, F, ReqBody, ResBody> Service<Request<ReqBody>> for BlocklistService<S>
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
        let host = req.uri().host().unwrap_or_default();
        if let Some(entry) = self.matching_entry(host) {
            tracing::debug!(host, blocked = entry, "Rejecting request to blocked domain");
            let err = HttpError::BlockedDomain {
                domain: entry.to_owned(),
            };
            return Box::pin(async move { Err(err) });
        }

        // Clone-swap pattern (Tower Service contract).
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move { inner.call(req).await })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Clone)]
    struct CountingService {
        calls: Arc<AtomicUsize>,
    }

    impl Service<Request<Full<Bytes>>> for CountingService {
        type Response = Response<Full<Bytes>>;
        type Error = HttpError;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Full<Bytes>>) -> Self::Future {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::new()))
                .unwrap()))
        }
    }

    fn get(uri: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_blocked_host_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = BlocklistLayer::new(["tracker.io", "ads."]).layer(CountingService {
            calls: calls.clone(),
        });

        let err = svc
            .clone()
            .oneshot(get("https://cdn.tracker.io/pixel.gif"))
            .await
            .unwrap_err();
        match err {
            HttpError::BlockedDomain { domain } => assert_eq!(domain, "tracker.io"),
            other => panic!("expected BlockedDomain, got: {other:?}"),
        }

        let err = svc
            .clone()
            .oneshot(get("http://ads.example.com/"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "domain ads. is blocked");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_other_hosts_pass_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = BlocklistLayer::new(["tracker.io"]).layer(CountingService {
            calls: calls.clone(),
        });

        let resp = svc.oneshot(get("https://example.com/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_entry_ignored() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = BlocklistLayer::new([""]).layer(CountingService {
            calls: calls.clone(),
        });

        svc.oneshot(get("https://example.com/")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
