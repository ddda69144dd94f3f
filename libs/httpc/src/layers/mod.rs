//! Tower layers that make up the transport chain
//!
//! Each layer wraps an inner transport, may rewrite the request, delegates,
//! and may inspect the response. The client stacks them in the order the
//! builder options were given; the last one added sees the request first.
//!
//! ## Available Layers
//!
//! - [`HeaderLayer`] - Sets a fixed group of headers
//! - [`BearerAuthLayer`] / [`BasicAuthLayer`] - Sets `Authorization`
//! - [`BlocklistLayer`] - Rejects requests to blocked hosts
//! - [`LoggingLayer`] - One line per request and per outcome
//! - [`DebugLayer`] - Full request/response trace with secrets masked
//! - [`RetryLayer`] - Retries with linear backoff, replaying the body
//!
//! The base transport additionally uses [`DefaultHeadersLayer`],
//! [`ContextLayer`] and [`RedirectPolicy`].

mod auth;
mod blocklist;
mod context;
mod debug;
mod headers;
mod logging;
mod redirect;
mod retry;

pub use auth::{AuthorizationService, BasicAuthLayer, BearerAuthLayer};
pub use blocklist::{BlocklistLayer, BlocklistService};
pub use context::{ContextLayer, ContextService};
pub use debug::{DEFAULT_MAX_BODY_LOG_SIZE, DebugLayer, DebugService, REDACTED, is_sensitive_header};
pub use headers::{DefaultHeadersLayer, DefaultHeadersService, HeaderLayer, HeaderService};
pub use logging::{LogSink, LoggingLayer, LoggingService, SharedSink, TracingSink};
pub use redirect::RedirectPolicy;
pub use retry::{RetryLayer, RetryService};
