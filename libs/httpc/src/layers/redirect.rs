use crate::config::RedirectConfig;
use http::{Request, Uri, header};
use tower_http::follow_redirect::policy::{Action, Attempt, Policy};

/// Headers removed once a redirect chain leaves the original origin
const CREDENTIAL_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
];

/// Redirect policy of the base transport.
///
/// Follows redirects to any host, up to `max_redirects`. Credentials are
/// dropped as soon as the chain crosses origins and HTTPS → HTTP hops stop
/// the chain (the 3xx response is then returned to the caller).
///
/// Request bodies are not cloned, so a 307/308 with a non-empty body is
/// returned to the caller unfollowed.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    config: RedirectConfig,
    /// Redirects followed so far (a fresh clone is used per request)
    followed: usize,
    /// Set once any hop changed origin
    crossed_origin: bool,
}

impl RedirectPolicy {
    /// Create a policy from the redirect settings
    #[must_use]
    pub fn new(config: RedirectConfig) -> Self {
        Self {
            config,
            followed: 0,
            crossed_origin: false,
        }
    }

    /// Scheme, host and port match. Missing schemes count as https.
    fn is_same_origin(from: &Uri, to: &Uri) -> bool {
        let from_scheme = from.scheme_str().unwrap_or("https");
        let to_scheme = to.scheme_str().unwrap_or("https");

        let from_port = from.port_u16().unwrap_or_else(|| default_port(from_scheme));
        let to_port = to.port_u16().unwrap_or_else(|| default_port(to_scheme));

        from_scheme == to_scheme
            && from.host().unwrap_or_default() == to.host().unwrap_or_default()
            && from_port == to_port
    }

    fn is_https_downgrade(from: &Uri, to: &Uri) -> bool {
        from.scheme_str().unwrap_or("https") == "https" && to.scheme_str() == Some("http")
    }
}

fn default_port(scheme: &str) -> u16 {
    match scheme {
        "http" => 80,
        "https" => 443,
        _ => 0,
    }
}

impl<B, E> Policy<B, E> for RedirectPolicy {
    fn redirect(&mut self, attempt: &Attempt<'_>) -> Result<Action, E> {
        self.followed += 1;
        if self.followed > self.config.max_redirects {
            tracing::debug!(
                count = self.followed,
                max = self.config.max_redirects,
                "Redirect limit reached"
            );
            return Ok(Action::Stop);
        }

        let from = attempt.previous();
        let to = attempt.location();

        if !self.config.allow_https_downgrade && Self::is_https_downgrade(from, to) {
            tracing::warn!(from = %from, to = %to, "Not following HTTPS to HTTP redirect");
            return Ok(Action::Stop);
        }

        if !Self::is_same_origin(from, to) {
            self.crossed_origin = true;
            tracing::debug!(from = %from, to = %to, "Following cross-origin redirect");
        }

        Ok(Action::Follow)
    }

    fn on_request(&mut self, request: &mut Request<B>) {
        if !(self.crossed_origin && self.config.strip_sensitive_headers) {
            return;
        }
        let headers = request.headers_mut();
        for name in CREDENTIAL_HEADERS {
            if headers.remove(name).is_some() {
                tracing::debug!(header = %name, "Stripped credential header on cross-origin redirect");
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_same_origin() {
        assert!(RedirectPolicy::is_same_origin(
            &uri("https://example.com/a"),
            &uri("https://example.com:443/b")
        ));
        assert!(!RedirectPolicy::is_same_origin(
            &uri("https://example.com/a"),
            &uri("https://other.com/b")
        ));
        assert!(!RedirectPolicy::is_same_origin(
            &uri("http://example.com/a"),
            &uri("http://example.com:8080/b")
        ));
        assert!(!RedirectPolicy::is_same_origin(
            &uri("https://example.com/a"),
            &uri("http://example.com/b")
        ));
    }

    #[test]
    fn test_https_downgrade() {
        assert!(RedirectPolicy::is_https_downgrade(
            &uri("https://example.com/a"),
            &uri("http://example.com/a")
        ));
        assert!(!RedirectPolicy::is_https_downgrade(
            &uri("http://example.com/a"),
            &uri("https://example.com/a")
        ));
        assert!(!RedirectPolicy::is_https_downgrade(
            &uri("http://example.com/a"),
            &uri("http://other.com/a")
        ));
    }

    #[test]
    fn test_credentials_stripped_after_cross_origin() {
        let mut policy = RedirectPolicy::new(RedirectConfig::default());
        policy.crossed_origin = true;

        let mut req = Request::builder()
            .uri("https://other.com/")
            .header(header::AUTHORIZATION, "Bearer t")
            .header(header::COOKIE, "a=b")
            .header(header::ACCEPT, "application/json")
            .body(())
            .unwrap();
        Policy::<(), ()>::on_request(&mut policy, &mut req);

        assert!(!req.headers().contains_key(header::AUTHORIZATION));
        assert!(!req.headers().contains_key(header::COOKIE));
        assert!(req.headers().contains_key(header::ACCEPT));
    }

    #[test]
    fn test_credentials_kept_same_origin() {
        let mut policy = RedirectPolicy::new(RedirectConfig::default());

        let mut req = Request::builder()
            .uri("https://example.com/next")
            .header(header::AUTHORIZATION, "Bearer t")
            .body(())
            .unwrap();
        Policy::<(), ()>::on_request(&mut policy, &mut req);

        assert!(req.headers().contains_key(header::AUTHORIZATION));
    }
}
