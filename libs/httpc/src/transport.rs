//! The type-erased transport and the base transport every chain starts from.

use crate::body::{RequestBody, ResponseBody};
use crate::config::HttpClientConfig;
use crate::error::HttpError;
use crate::layers::{ContextLayer, DefaultHeadersLayer, RedirectPolicy};
use crate::tls;
use http::{Request, Response};
use http_body_util::BodyExt;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tower::util::BoxCloneSyncService;
use tower::{Layer, ServiceBuilder, ServiceExt};
use tower_http::follow_redirect::FollowRedirectLayer;

/// A transport: anything that turns a request into a response.
///
/// Both the base transport and every wrapper in the chain are erased to this
/// type, so wrappers compose without naming each other. It is `Clone`,
/// `Send` and `Sync`; clones share the underlying connection pool.
pub type Transport = BoxCloneSyncService<Request<RequestBody>, Response<ResponseBody>, HttpError>;

/// Erase a tower service into a [`Transport`].
pub(crate) fn boxed<S>(service: S) -> Transport
where
    S: tower::Service<Request<RequestBody>, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    BoxCloneSyncService::new(service)
}

/// Apply `layer` on top of `transport` and erase the result.
pub(crate) fn layered<L>(layer: &L, transport: Transport) -> Transport
where
    L: Layer<Transport>,
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
    boxed(layer.layer(transport))
}

/// Build the base transport: a pooled hyper client speaking HTTP/1.1 and
/// HTTP/2 over plain TCP or rustls, following redirects per
/// [`RedirectPolicy`].
///
/// Request flow (outer to inner):
///   `DefaultHeaders` → `Context` → error mapping → `FollowRedirect` → hyper client
///
/// # Errors
///
/// Returns `HttpError::Tls` if the TLS root store cannot be set up.
pub fn base_transport(config: &HttpClientConfig) -> Result<Transport, HttpError> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(true);
    http.set_connect_timeout(config.connect_timeout);
    let https = tls::build_https_connector(config.tls_roots, http)?;

    // pool_timer is required for pool_idle_timeout to take effect
    let mut client_builder = Client::builder(TokioExecutor::new());
    client_builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout);
    let hyper_client = client_builder.build::<_, RequestBody>(https);

    let network = ServiceBuilder::new()
        .layer(FollowRedirectLayer::with_policy(RedirectPolicy::new(
            config.redirect.clone(),
        )))
        .service(hyper_client)
        .map_response(|resp: Response<hyper::body::Incoming>| {
            let (parts, body) = resp.into_parts();
            let body: ResponseBody = body.map_err(Into::into).boxed();
            Response::from_parts(parts, body)
        })
        .map_err(HttpError::from);

    let service = ServiceBuilder::new()
        .layer(DefaultHeadersLayer::new())
        .layer(ContextLayer)
        .service(network);

    Ok(boxed(service))
}
