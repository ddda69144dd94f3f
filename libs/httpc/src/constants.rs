//! Common `Content-Type` values.

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_XML: &str = "application/xml";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_MULTIPART: &str = "multipart/form-data";
pub const CONTENT_TYPE_PLAIN_TEXT: &str = "text/plain";
pub const CONTENT_TYPE_HTML: &str = "text/html";
pub const CONTENT_TYPE_CSV: &str = "text/csv";
/// Legacy CSV media type still sent by some servers
pub const CONTENT_TYPE_APPLICATION_CSV: &str = "application/csv";
pub const CONTENT_TYPE_JAVASCRIPT: &str = "application/javascript";
pub const CONTENT_TYPE_CSS: &str = "text/css";
pub const CONTENT_TYPE_PDF: &str = "application/pdf";
pub const CONTENT_TYPE_ZIP: &str = "application/zip";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";
