use crate::context::RequestContext;
use crate::error::HttpError;
use http::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that aborts the inner call when the request's
/// [`RequestContext`] is cancelled or runs out of time.
///
/// The context is read from the request extensions; requests without one
/// pass through unbounded. Dropping the inner future drops the in-flight
/// network exchange with it.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContextLayer;

impl<S> Layer<S> for ContextLayer {
    type Service = ContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ContextService { inner }
    }
}

/// Service created by [`ContextLayer`]
#[derive(Clone, Debug)]
pub struct ContextService<S> {
    inner: S,
}

impl<S, F, ReqBody, ResBody> Service<Request<ReqBody>> for ContextService<S>
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

        match req.extensions().get::<RequestContext>().cloned() {
            Some(ctx) => Box::pin(async move { ctx.run(inner.call(req)).await }),
            None => Box::pin(inner.call(req)),
        }
    }
}
