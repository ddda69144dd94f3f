//! TLS setup for the base transport.

use crate::config::TlsRootConfig;
use crate::error::HttpError;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use std::sync::Arc;

/// Get the crypto provider for TLS connections.
///
/// Uses the process-wide default when one is installed, otherwise an
/// aws-lc-rs provider that is not installed globally.
#[must_use]
pub fn get_crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Build a rustls `ClientConfig` trusting the OS certificate store.
///
/// # Errors
///
/// Returns `HttpError::Tls` when the store yields no usable certificate, so
/// misconfiguration shows up at client construction instead of at the first
/// handshake.
pub fn native_roots_client_config() -> Result<rustls::ClientConfig, HttpError> {
    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }
    if loaded.certs.is_empty() {
        return Err(HttpError::Tls(
            "no native root CA certificates found in OS certificate store".into(),
        ));
    }

    let found = loaded.certs.len();
    let mut root_store = rustls::RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(loaded.certs);
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    if added == 0 {
        return Err(HttpError::Tls(
            format!("no valid native root CA certificates parsed (found {found})").into(),
        ));
    }
    tracing::debug!(count = added, "loaded native root certificates");

    rustls::ClientConfig::builder_with_provider(get_crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls(Box::new(e)))
        .map(|builder| {
            builder
                .with_root_certificates(root_store)
                .with_no_client_auth()
        })
}

/// Wrap `http` in a connector that speaks TLS for `https://` and plain TCP
/// for `http://`, negotiating HTTP/2 through ALPN.
///
/// # Errors
///
/// Returns `HttpError::Tls` if the root store cannot be set up.
pub fn build_https_connector(
    tls_roots: TlsRootConfig,
    http: HttpConnector,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let builder = match tls_roots {
        TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(get_crypto_provider())
            .map_err(|e| HttpError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => {
            hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(native_roots_client_config()?)
        }
    };
    Ok(builder
        .https_or_http()
        .enable_all_versions()
        .wrap_connector(http))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_webpki_connector_builds() {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        assert!(build_https_connector(TlsRootConfig::WebPki, http).is_ok());
    }

    #[test]
    fn test_native_roots_client_config() {
        // Minimal containers have no OS store; only a typed error is required.
        match native_roots_client_config() {
            Ok(_) => {}
            Err(e) => assert!(matches!(e, HttpError::Tls(_))),
        }
    }
}
