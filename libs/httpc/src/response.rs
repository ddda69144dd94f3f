use crate::body::{self, GzipError, ResponseBody};
use crate::context::RequestContext;
use crate::error::{HttpError, StatusError};
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode, Version};
use serde::de::DeserializeOwned;

/// HTTP response wrapper with body caching and format decoding
///
/// The body is read once, on the first call to any body accessor:
/// - `resp.bytes().await?` - Raw bytes, gzip-decoded when
///   `Content-Encoding: gzip`
/// - `resp.text().await?` - UTF-8 text (lossy)
/// - `resp.json::<T>().await?` / `resp.xml::<T>().await?` - Decoded values
/// - `resp.csv::<T>().await?` - One `T` per data row, columns matched by the
///   header row
///
/// Later accessors reuse the cached bytes, so they can be mixed freely.
/// Reads are bounded by the client's `max_body_size` and observe the request
/// timeout and context.
///
/// No accessor checks the status; use [`error_for_status`](Self::error_for_status)
/// or [`is_success`](Self::is_success).
pub struct HttpResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Option<ResponseBody>,
    cache: Option<Bytes>,
    csv_separator: u8,
    max_body_size: usize,
    ctx: RequestContext,
}

impl HttpResponse {
    pub(crate) fn new(
        response: Response<ResponseBody>,
        max_body_size: usize,
        ctx: RequestContext,
    ) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            body: Some(body),
            cache: None,
            csv_separator: b',',
            max_body_size,
            ctx,
        }
    }

    /// Get the response status code
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the HTTP version the response was received over
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get the response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the status is in `200..300`
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Turn a non-2xx response into `HttpError::HttpStatus`.
    ///
    /// The error carries the canonical reason phrase as its message and the
    /// cached body, if one was already read. The body is not read here.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::HttpStatus` if the response status is not 2xx.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut resp = client.get("/api/users").send().await?.error_for_status()?;
    /// let users: Vec<User> = resp.json().await?;
    /// ```
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.is_success() {
            return Ok(self);
        }
        let message = self
            .status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_owned();
        let error = StatusError::new(self.status, message);
        Err(match self.cache {
            Some(cached) => error.with_body(cached),
            None => error,
        }
        .into())
    }

    /// Set the field separator used by [`csv`](Self::csv) (default `,`)
    pub fn set_csv_separator(&mut self, separator: u8) -> &mut Self {
        self.csv_separator = separator;
        self
    }

    /// Read the whole body, caching it for every later accessor.
    ///
    /// A gzip-encoded body is decompressed before caching; `max_body_size`
    /// bounds both the received and the decompressed size.
    ///
    /// # Errors
    ///
    /// - `HttpError::Transport` if the stream fails. The stream is gone
    ///   afterwards, so a later call returns `HttpError::BodyClosed`.
    /// - `HttpError::BodyTooLarge` if the body exceeds `max_body_size`.
    /// - `HttpError::Decompress` if gzip decoding fails; the error carries the
    ///   raw bytes.
    /// - The context error if the request timeout or context fires mid-read.
    pub async fn bytes(&mut self) -> Result<Bytes, HttpError> {
        if let Some(cached) = &self.cache {
            return Ok(cached.clone());
        }
        let stream = self.body.take().ok_or(HttpError::BodyClosed)?;

        let limit = self.max_body_size;
        let raw = self.ctx.run(body::read_limited(stream, limit)).await?;
        let data = if body::is_gzip_encoded(&self.headers) {
            body::decode_gzip(&raw, limit).map_err(|e| match e {
                GzipError::Io(source) => HttpError::Decompress {
                    source,
                    raw: raw.clone(),
                },
                GzipError::TooLarge { limit, actual } => HttpError::BodyTooLarge { limit, actual },
            })?
        } else {
            raw
        };

        self.cache = Some(data.clone());
        Ok(data)
    }

    /// Read the body as text. Invalid UTF-8 sequences are replaced with the
    /// Unicode replacement character.
    ///
    /// # Errors
    ///
    /// Same as [`bytes`](Self::bytes).
    pub async fn text(&mut self) -> Result<String, HttpError> {
        let data = self.bytes().await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Decode the body as JSON
    ///
    /// # Errors
    ///
    /// Same as [`bytes`](Self::bytes), plus `HttpError::Json` if decoding
    /// fails. The cache is kept either way.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T, HttpError> {
        let data = self.bytes().await?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Decode the body as XML
    ///
    /// # Errors
    ///
    /// Same as [`bytes`](Self::bytes), plus `HttpError::Xml` if decoding fails.
    pub async fn xml<T: DeserializeOwned>(&mut self) -> Result<T, HttpError> {
        let data = self.bytes().await?;
        Ok(quick_xml::de::from_reader(data.as_ref())?)
    }

    /// Decode the body as CSV.
    ///
    /// The first row names the columns; each following row becomes one `T`,
    /// with columns matched to field names (or `#[serde(rename)]`). An empty
    /// body yields an empty vector.
    ///
    /// # Errors
    ///
    /// Same as [`bytes`](Self::bytes), plus `HttpError::Csv` for malformed
    /// rows or values that do not fit their field.
    pub async fn csv<T: DeserializeOwned>(&mut self) -> Result<Vec<T>, HttpError> {
        let data = self.bytes().await?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.csv_separator)
            .from_reader(data.as_ref());
        let rows = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
        Ok(rows)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("cached", &self.cache.as_ref().map(Bytes::len))
            .field("csv_separator", &char::from(self.csv_separator))
            .finish_non_exhaustive()
    }
}
