//! Body types shared by every transport in the chain, plus the gzip and
//! bounded-read helpers used by the response wrapper and the debug layer.

use crate::error::HttpError;
use bytes::Bytes;
use http::HeaderMap;
use http_body_util::combinators::{BoxBody, UnsyncBoxBody};
use http_body_util::{BodyExt, Empty, Full};
use std::io::Read;

/// Boxed error carried by body streams
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Type-erased outgoing body.
///
/// Streams supplied through [`RequestBuilder::body_stream`] need only be
/// `Send`, so the request side is unsync-boxed.
///
/// [`RequestBuilder::body_stream`]: crate::RequestBuilder::body_stream
pub type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

/// Type-erased incoming body as returned by the transport chain
pub type ResponseBody = BoxBody<Bytes, BoxError>;

/// Request body over a fully buffered payload
#[must_use]
pub fn full(bytes: impl Into<Bytes>) -> RequestBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Request body with no payload
#[must_use]
pub fn empty() -> RequestBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Response body over a fully buffered payload
#[must_use]
pub fn full_response(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Whether `Content-Encoding` case-insensitively equals `gzip`
#[must_use]
pub fn is_gzip_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"))
}

/// Failure while inflating a gzip payload
#[derive(Debug)]
pub enum GzipError {
    /// Stream is not valid gzip
    Io(std::io::Error),
    /// Inflated size passed the configured limit
    TooLarge { limit: usize, actual: usize },
}

/// Inflate a gzip payload, refusing to produce more than `limit` bytes.
///
/// An empty payload decodes to an empty buffer.
///
/// # Errors
///
/// Returns [`GzipError::Io`] for corrupt input and [`GzipError::TooLarge`]
/// when the inflated output exceeds `limit`.
pub fn decode_gzip(raw: &[u8], limit: usize) -> Result<Bytes, GzipError> {
    if raw.is_empty() {
        return Ok(Bytes::new());
    }

    let mut decoder = flate2::read::GzDecoder::new(raw);
    let mut decoded = Vec::new();
    let mut chunk = [0_u8; 8 * 1024];

    loop {
        let read = decoder.read(&mut chunk).map_err(GzipError::Io)?;
        if read == 0 {
            break;
        }
        let next_size = decoded.len().saturating_add(read);
        if next_size > limit {
            return Err(GzipError::TooLarge {
                limit,
                actual: next_size,
            });
        }
        decoded.extend_from_slice(&chunk[..read]);
    }

    Ok(Bytes::from(decoded))
}

/// Collect a response body, failing once more than `limit` bytes arrive.
///
/// # Errors
///
/// Returns `HttpError::Transport` if the stream fails and
/// `HttpError::BodyTooLarge` if the limit is exceeded.
pub async fn read_limited(body: ResponseBody, limit: usize) -> Result<Bytes, HttpError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}
