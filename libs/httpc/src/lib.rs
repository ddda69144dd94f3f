#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Fluent HTTP client with composable transport middleware
//!
//! This crate wraps a pooled hyper client with:
//! - A fluent request builder (base URL resolution, query merging, JSON /
//!   XML / form bodies, per-request timeout and cancellation)
//! - A transport chain of tower layers: header injection, bearer and basic
//!   auth, domain blocklist, logging, debug tracing with secret masking and
//!   retry with linear backoff
//! - A response wrapper that caches the body and decodes gzip, JSON, XML and
//!   CSV
//! - TLS via rustls (webpki or OS roots) and redirect following that drops
//!   credentials across origins
//!
//! # Chain order
//!
//! Wrappers are stacked in the order their builder options are called; the
//! last one added sees the request first. See [`HttpClientBuilder`].
//!
//! # Example
//!
//! ```ignore
//! use httpc::{HttpClient, RetryConfig};
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .base_url("https://api.example.com")
//!     .timeout(Duration::from_secs(10))
//!     .bearer_auth(token)
//!     .retry(RetryConfig::new(3, Duration::from_millis(250)))
//!     .logger(httpc::TracingSink)
//!     .build()?;
//!
//! let mut resp = client.get("/users").query("active", "true").send().await?;
//! let users: Vec<User> = resp.json().await?;
//! ```

pub mod body;
mod builder;
mod client;
mod config;
pub mod constants;
mod context;
mod error;
mod layers;
mod methods;
mod request;
mod response;
mod tls;
mod transport;

pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use config::{
    DEFAULT_ACCEPT, DEFAULT_ACCEPT_ENCODING, DEFAULT_API_KEY_HEADER, DEFAULT_REQUEST_ID_HEADER,
    DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, HttpClientConfig,
    RedirectConfig, RetryConfig, RetryOutcome, RetryPredicate, TlsRootConfig,
    default_retry_condition,
};
pub use context::RequestContext;
pub use error::{HttpError, InvalidUriKind, StatusError, is_timeout};
pub use layers::{
    AuthorizationService, BasicAuthLayer, BearerAuthLayer, BlocklistLayer, BlocklistService,
    ContextLayer, ContextService, DEFAULT_MAX_BODY_LOG_SIZE, DebugLayer, DebugService,
    DefaultHeadersLayer, DefaultHeadersService, HeaderLayer, HeaderService, LogSink, LoggingLayer,
    LoggingService, REDACTED, RedirectPolicy, RetryLayer, RetryService, SharedSink, TracingSink,
    is_sensitive_header,
};
pub use request::{RequestBuilder, RequestOption};
pub use response::HttpResponse;
pub use tls::get_crypto_provider;
pub use transport::{Transport, base_transport};
