//! Origin checks for mutating requests.
//!
//! [`OriginGuard`] compares the host of a request's declared origin (the
//! `Origin` header, else `Referer`) against an allow-list. Requests that
//! declare no origin are allowed, and so are origins whose host equals the
//! host the request was addressed to.

use crate::application::metrics::Metrics;
use crate::domain::error::ErrorCode;
use crate::infrastructure::config::GuardConfig;
use url::Url;

/// Log target for rejected origins.
pub const ORIGIN_TARGET: &str = "portal_guard::origin";

/// The request headers the guard layer looks at.
///
/// Header names are matched case-insensitively by [`RequestContext::from_headers`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub origin: Option<String>,
    pub referer: Option<String>,
    pub host: Option<String>,
    pub forwarded_host: Option<String>,
    pub forwarded_for: Option<String>,
    pub real_ip: Option<String>,
    pub cf_connecting_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from raw `(name, value)` header pairs.
    ///
    /// Unknown headers are ignored. When a header repeats, the first value wins.
    ///
    /// ```
    /// use portal_guard::application::origin::RequestContext;
    ///
    /// let ctx = RequestContext::from_headers([
    ///     ("Origin", "https://portal.example.com"),
    ///     ("X-Forwarded-For", "203.0.113.5, 10.0.0.1"),
    /// ]);
    /// assert_eq!(ctx.origin.as_deref(), Some("https://portal.example.com"));
    /// assert_eq!(ctx.client_ip().as_deref(), Some("203.0.113.5"));
    /// ```
    pub fn from_headers<I, N, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let mut ctx = Self::default();
        for (name, value) in headers {
            let slot = match name.as_ref().to_ascii_lowercase().as_str() {
                "origin" => &mut ctx.origin,
                "referer" => &mut ctx.referer,
                "host" => &mut ctx.host,
                "x-forwarded-host" => &mut ctx.forwarded_host,
                "x-forwarded-for" => &mut ctx.forwarded_for,
                "x-real-ip" => &mut ctx.real_ip,
                "cf-connecting-ip" => &mut ctx.cf_connecting_ip,
                "user-agent" => &mut ctx.user_agent,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.as_ref().to_string());
            }
        }
        ctx
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_forwarded_host(mut self, host: impl Into<String>) -> Self {
        self.forwarded_host = Some(host.into());
        self
    }

    pub fn with_forwarded_for(mut self, chain: impl Into<String>) -> Self {
        self.forwarded_for = Some(chain.into());
        self
    }

    pub fn with_real_ip(mut self, ip: impl Into<String>) -> Self {
        self.real_ip = Some(ip.into());
        self
    }

    pub fn with_cf_connecting_ip(mut self, ip: impl Into<String>) -> Self {
        self.cf_connecting_ip = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Client address: first `x-forwarded-for` hop, then `x-real-ip`, then
    /// `cf-connecting-ip`.
    pub fn client_ip(&self) -> Option<String> {
        if let Some(chain) = non_empty(&self.forwarded_for) {
            return first_value(chain);
        }
        non_empty(&self.real_ip)
            .or_else(|| non_empty(&self.cf_connecting_ip))
            .map(str::to_string)
    }

    /// Host the request was addressed to: first `x-forwarded-host` value,
    /// else `host`.
    pub fn request_host(&self) -> Option<String> {
        if let Some(forwarded) = non_empty(&self.forwarded_host) {
            return first_value(forwarded);
        }
        non_empty(&self.host).map(str::to_string)
    }

    /// The `Origin` header, falling back to `Referer`.
    pub fn declared_origin(&self) -> Option<&str> {
        non_empty(&self.origin).or_else(|| non_empty(&self.referer))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn first_value(list: &str) -> Option<String> {
    list.split(',')
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `host[:port]` of a URL, with the scheme's default port omitted.
fn url_host(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn host_of(origin: &str) -> Option<String> {
    Url::parse(origin).ok().as_ref().and_then(url_host)
}

/// Rejects cross-site mutations.
///
/// # Examples
///
/// ```
/// use portal_guard::application::origin::{OriginGuard, RequestContext};
/// use portal_guard::ErrorCode;
///
/// let guard = OriginGuard::new(["https://portal.example.com"]);
///
/// let same_site = RequestContext::new().with_origin("https://portal.example.com");
/// assert_eq!(guard.enforce_allowed_origin("update_profile", &same_site), None);
///
/// let forged = RequestContext::new().with_origin("https://evil.example");
/// assert_eq!(
///     guard.enforce_allowed_origin("update_profile", &forged),
///     Some(ErrorCode::Forbidden)
/// );
/// ```
#[derive(Debug, Clone)]
pub struct OriginGuard {
    allowed_hosts: Vec<String>,
    metrics: Metrics,
}

impl OriginGuard {
    /// Guard allowing the given origins. Entries that are not absolute URLs
    /// are ignored.
    pub fn new<I, S>(allowed_origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed_hosts = Vec::new();
        for origin in allowed_origins {
            match host_of(origin.as_ref()) {
                Some(host) if !allowed_hosts.contains(&host) => allowed_hosts.push(host),
                Some(_) => {}
                None => tracing::debug!(origin = origin.as_ref(), "Ignoring unparsable allowed origin"),
            }
        }
        Self {
            allowed_hosts,
            metrics: Metrics::new(),
        }
    }

    /// Guard using [`GuardConfig::allowed_origins`].
    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(config.allowed_origins())
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Hosts (with non-default ports) the guard accepts.
    pub fn allowed_hosts(&self) -> &[String] {
        &self.allowed_hosts
    }

    /// Whether the request's declared origin is acceptable. No side effects.
    pub fn check(&self, ctx: &RequestContext) -> bool {
        let Some(declared) = ctx.declared_origin() else {
            return true;
        };
        let Some(origin_host) = host_of(declared) else {
            return false;
        };
        if self.allowed_hosts.contains(&origin_host) {
            return true;
        }

        ctx.request_host()
            .and_then(|host| host_of(&format!("http://{}", host)))
            .is_some_and(|request_host| request_host == origin_host)
    }

    /// `None` when the request may proceed, `Some(Forbidden)` otherwise.
    ///
    /// Rejections are logged at warn level on [`ORIGIN_TARGET`].
    pub fn enforce_allowed_origin(&self, action: &str, ctx: &RequestContext) -> Option<ErrorCode> {
        if self.check(ctx) {
            return None;
        }

        self.metrics.record_origin_rejection();
        tracing::warn!(
            target: ORIGIN_TARGET,
            action,
            origin = ctx.declared_origin().unwrap_or_default(),
            "Blocked {} from origin",
            action
        );
        Some(ErrorCode::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> OriginGuard {
        OriginGuard::new(["https://portal.example.com", "http://localhost:3000"])
    }

    #[test]
    fn test_missing_origin_is_allowed() {
        assert!(guard().check(&RequestContext::new()));
        assert!(guard().check(&RequestContext::new().with_origin("  ")));
    }

    #[test]
    fn test_allow_list_matches_host_and_port() {
        let guard = guard();
        assert!(guard.check(&RequestContext::new().with_origin("https://portal.example.com")));
        assert!(guard.check(&RequestContext::new().with_origin("http://localhost:3000")));
        assert!(!guard.check(&RequestContext::new().with_origin("http://localhost:4000")));
        assert!(!guard.check(&RequestContext::new().with_origin("https://portal.example.com.evil.io")));
    }

    #[test]
    fn test_referer_fallback() {
        let guard = guard();
        let ok = RequestContext::new().with_referer("https://portal.example.com/profile/edit");
        let bad = RequestContext::new().with_referer("https://evil.example/page");

        assert!(guard.check(&ok));
        assert!(!guard.check(&bad));
    }

    #[test]
    fn test_same_host_fallback() {
        let guard = guard();
        let ctx = RequestContext::new()
            .with_origin("https://preview-123.example.app")
            .with_host("preview-123.example.app");
        assert!(guard.check(&ctx));

        let forwarded = RequestContext::new()
            .with_origin("https://preview-123.example.app")
            .with_host("internal:8080")
            .with_forwarded_host("preview-123.example.app, proxy.local");
        assert!(guard.check(&forwarded));

        let mismatch = RequestContext::new()
            .with_origin("https://evil.example")
            .with_host("portal.example.com");
        assert!(!guard.check(&mismatch));
    }

    #[test]
    fn test_malformed_origin_is_rejected() {
        let ctx = RequestContext::new().with_origin("not a url").with_host("not a url");
        assert_eq!(
            guard().enforce_allowed_origin("share", &ctx),
            Some(ErrorCode::Forbidden)
        );
    }

    #[test]
    fn test_rejection_counts_metric() {
        let metrics = Metrics::new();
        let guard = guard().with_metrics(metrics.clone());

        guard.enforce_allowed_origin("x", &RequestContext::new().with_origin("https://evil.example"));
        guard.enforce_allowed_origin("x", &RequestContext::new());

        assert_eq!(metrics.snapshot().origin_rejections, 1);
    }

    #[test]
    fn test_client_ip_precedence() {
        let ctx = RequestContext::new()
            .with_forwarded_for(" 203.0.113.5 , 10.0.0.1")
            .with_real_ip("198.51.100.2");
        assert_eq!(ctx.client_ip().as_deref(), Some("203.0.113.5"));

        let ctx = RequestContext::new()
            .with_real_ip("198.51.100.2")
            .with_cf_connecting_ip("192.0.2.9");
        assert_eq!(ctx.client_ip().as_deref(), Some("198.51.100.2"));

        let ctx = RequestContext::new().with_cf_connecting_ip("192.0.2.9");
        assert_eq!(ctx.client_ip().as_deref(), Some("192.0.2.9"));

        assert_eq!(RequestContext::new().client_ip(), None);
    }

    #[test]
    fn test_from_headers_is_case_insensitive() {
        let ctx = RequestContext::from_headers([
            ("HOST", "portal.example.com"),
            ("User-Agent", "curl/8.0"),
            ("X-Unrelated", "1"),
        ]);
        assert_eq!(ctx.request_host().as_deref(), Some("portal.example.com"));
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn test_allowed_hosts_are_deduplicated() {
        let guard = OriginGuard::new(["https://a.example", "https://a.example/", "garbage"]);
        assert_eq!(guard.allowed_hosts(), ["a.example".to_string()]);
    }
}
