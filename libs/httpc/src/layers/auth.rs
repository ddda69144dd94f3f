use crate::error::HttpError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::header::AUTHORIZATION;
use http::{HeaderValue, Request, Response};
use secrecy::{ExposeSecret, SecretString};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Header value flagged sensitive so it is hidden from `Debug` output and
/// excluded from HPACK indexing
fn sensitive_value(raw: &str) -> Result<HeaderValue, HttpError> {
    let mut value = HeaderValue::from_str(raw)?;
    value.set_sensitive(true);
    Ok(value)
}

/// Tower layer that sets `Authorization: Bearer <token>` on every request,
/// replacing any existing `Authorization` header.
#[derive(Clone, Debug)]
pub struct BearerAuthLayer {
    value: HeaderValue,
}

impl BearerAuthLayer {
    /// Create the layer from a token
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if the token contains bytes not
    /// allowed in a header value.
    pub fn try_new(token: &SecretString) -> Result<Self, HttpError> {
        let value = sensitive_value(&format!("Bearer {}", token.expose_secret()))?;
        Ok(Self { value })
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = AuthorizationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizationService {
            inner,
            value: self.value.clone(),
        }
    }
}

/// Tower layer that sets `Authorization: Basic base64(user:pass)` on every
/// request, replacing any existing `Authorization` header.
#[derive(Clone, Debug)]
pub struct BasicAuthLayer {
    value: HeaderValue,
}

impl BasicAuthLayer {
    /// Create the layer from a username and password
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if the encoded credentials do not
    /// form a valid header value.
    pub fn try_new(username: &str, password: &SecretString) -> Result<Self, HttpError> {
        let encoded = STANDARD.encode(format!("{username}:{}", password.expose_secret()));
        let value = sensitive_value(&format!("Basic {encoded}"))?;
        Ok(Self { value })
    }
}

impl<S> Layer<S> for BasicAuthLayer {
    type Service = AuthorizationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizationService {
            inner,
            value: self.value.clone(),
        }
    }
}

/// Service that writes a precomputed `Authorization` value.
///
/// Created by [`BearerAuthLayer`] and [`BasicAuthLayer`].
#[derive(Clone, Debug)]
pub struct AuthorizationService<S> {
    inner: S,
    value: HeaderValue,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AuthorizationService<S>
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
        req.headers_mut().insert(AUTHORIZATION, self.value.clone());
        self.inner.call(req)
    }
}
