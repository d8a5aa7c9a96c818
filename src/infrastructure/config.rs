//! Guard configuration from the environment, TOML or code.
//!
//! Environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `CRON_SECRET` | `cron_secret` |
//! | `NEXT_PUBLIC_SITE_URL` (or `SITE_URL`) | `site_url` |
//! | `VERCEL_URL` | `deployment_host` |
//! | `ALLOWED_ORIGINS` (comma separated) | `extra_allowed_origins` |
//! | `REDIS_URL` | `redis_url` |
//! | `GUARD_MAX_COUNTER_ENTRIES` | `max_counter_entries` |
//! | `GUARD_SWEEP_INTERVAL_SECS` | `sweep_interval` |
//!
//! Empty values count as unset.

use crate::domain::secret::SharedSecret;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Origin that is allowed unless `include_localhost` is turned off.
pub const LOCAL_DEV_ORIGIN: &str = "http://localhost:3000";
/// Default cap on in-memory counter entries.
pub const DEFAULT_MAX_COUNTER_ENTRIES: usize = 10_000;
/// Default interval between sweeps of expired counters.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Errors that can occur when loading or building a [`GuardConfig`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A numeric setting did not parse.
    InvalidNumber { name: &'static str, value: String },
    /// An origin or URL setting did not parse.
    InvalidUrl { name: &'static str, value: String },
    /// Counter cap must be greater than 0.
    ZeroMaxEntries,
    /// Sweep interval must be greater than 0.
    ZeroSweepInterval,
    /// TOML input was malformed.
    InvalidToml(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{} must be a positive integer, got {:?}", name, value)
            }
            ConfigError::InvalidUrl { name, value } => {
                write!(f, "{} is not a valid URL: {:?}", name, value)
            }
            ConfigError::ZeroMaxEntries => write!(f, "max_counter_entries must be greater than 0"),
            ConfigError::ZeroSweepInterval => write!(f, "sweep_interval must be greater than 0"),
            ConfigError::InvalidToml(msg) => write!(f, "invalid TOML configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Settings for every gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardConfig {
    pub cron_secret: Option<SharedSecret>,
    /// Public URL of the portal, e.g. `https://portal.example.com`
    pub site_url: Option<String>,
    /// Bare deployment host, allowed as `https://{host}`
    pub deployment_host: Option<String>,
    pub extra_allowed_origins: Vec<String>,
    /// Allow [`LOCAL_DEV_ORIGIN`]
    pub include_localhost: bool,
    pub redis_url: Option<String>,
    pub max_counter_entries: usize,
    pub sweep_interval: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            cron_secret: None,
            site_url: None,
            deployment_host: None,
            extra_allowed_origins: Vec::new(),
            include_localhost: true,
            redis_url: None,
            max_counter_entries: DEFAULT_MAX_COUNTER_ENTRIES,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    cron_secret: Option<String>,
    site_url: Option<String>,
    deployment_host: Option<String>,
    allowed_origins: Vec<String>,
    include_localhost: Option<bool>,
    redis_url: Option<String>,
    max_counter_entries: Option<usize>,
    sweep_interval_secs: Option<u64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: value.to_string(),
    })
}

/// Canonical `scheme://host[:port]` form of an origin.
fn normalize_origin(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        name,
        value: value.to_string(),
    };
    let url = Url::parse(value).map_err(|_| invalid())?;
    if url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(url.origin().ascii_serialization())
}

impl GuardConfig {
    /// Start building a configuration.
    pub fn builder() -> GuardConfigBuilder {
        GuardConfigBuilder::default()
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| non_empty(lookup(name));

        let mut builder = Self::builder();
        if let Some(secret) = var("CRON_SECRET") {
            builder = builder.cron_secret(secret);
        }
        if let Some(site) = var("NEXT_PUBLIC_SITE_URL").or_else(|| var("SITE_URL")) {
            builder = builder.site_url(site);
        }
        if let Some(host) = var("VERCEL_URL") {
            builder = builder.deployment_host(host);
        }
        if let Some(origins) = var("ALLOWED_ORIGINS") {
            for origin in origins.split(',').map(str::trim).filter(|o| !o.is_empty()) {
                builder = builder.allow_origin(origin);
            }
        }
        if let Some(url) = var("REDIS_URL") {
            builder = builder.redis_url(url);
        }
        if let Some(raw) = var("GUARD_MAX_COUNTER_ENTRIES") {
            builder = builder.max_counter_entries(parse_number("GUARD_MAX_COUNTER_ENTRIES", &raw)?);
        }
        if let Some(raw) = var("GUARD_SWEEP_INTERVAL_SECS") {
            let secs: u64 = parse_number("GUARD_SWEEP_INTERVAL_SECS", &raw)?;
            builder = builder.sweep_interval(Duration::from_secs(secs));
        }
        builder.build()
    }

    /// Parse a TOML document using the same keys as the builder.
    ///
    /// ```
    /// use portal_guard::GuardConfig;
    ///
    /// let config = GuardConfig::from_toml_str(r#"
    ///     site_url = "https://portal.example.com"
    ///     include_localhost = false
    /// "#).unwrap();
    ///
    /// assert_eq!(config.allowed_origins(), vec!["https://portal.example.com"]);
    /// ```
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(input).map_err(|e| ConfigError::InvalidToml(e.to_string()))?;

        let mut builder = Self::builder();
        if let Some(secret) = non_empty(raw.cron_secret) {
            builder = builder.cron_secret(secret);
        }
        if let Some(site) = non_empty(raw.site_url) {
            builder = builder.site_url(site);
        }
        if let Some(host) = non_empty(raw.deployment_host) {
            builder = builder.deployment_host(host);
        }
        for origin in raw.allowed_origins {
            if let Some(origin) = non_empty(Some(origin)) {
                builder = builder.allow_origin(origin);
            }
        }
        if let Some(include) = raw.include_localhost {
            builder = builder.include_localhost(include);
        }
        if let Some(url) = non_empty(raw.redis_url) {
            builder = builder.redis_url(url);
        }
        if let Some(max) = raw.max_counter_entries {
            builder = builder.max_counter_entries(max);
        }
        if let Some(secs) = raw.sweep_interval_secs {
            builder = builder.sweep_interval(Duration::from_secs(secs));
        }
        builder.build()
    }

    /// Deduplicated allow-list in `scheme://host[:port]` form.
    ///
    /// Order: site URL, deployment host, extra origins, local development.
    pub fn allowed_origins(&self) -> Vec<String> {
        let deployment = self
            .deployment_host
            .as_ref()
            .map(|host| format!("https://{}", host));
        let localhost = self.include_localhost.then(|| LOCAL_DEV_ORIGIN.to_string());

        let mut origins: Vec<String> = Vec::new();
        let candidates = self
            .site_url
            .iter()
            .chain(deployment.iter())
            .chain(self.extra_allowed_origins.iter())
            .chain(localhost.iter());
        for candidate in candidates {
            // Entries were validated at build time
            if let Ok(origin) = normalize_origin("origin", candidate) {
                if !origins.contains(&origin) {
                    origins.push(origin);
                }
            }
        }
        origins
    }
}

/// Builder for [`GuardConfig`].
#[derive(Debug, Default)]
pub struct GuardConfigBuilder {
    cron_secret: Option<String>,
    site_url: Option<String>,
    deployment_host: Option<String>,
    extra_allowed_origins: Vec<String>,
    include_localhost: Option<bool>,
    redis_url: Option<String>,
    max_counter_entries: Option<usize>,
    sweep_interval: Option<Duration>,
}

impl GuardConfigBuilder {
    /// Shared secret expected in `Authorization: Bearer <secret>` on cron calls.
    pub fn cron_secret(mut self, secret: impl Into<String>) -> Self {
        self.cron_secret = Some(secret.into());
        self
    }

    pub fn site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = Some(url.into());
        self
    }

    /// Bare host of the current deployment, without scheme.
    pub fn deployment_host(mut self, host: impl Into<String>) -> Self {
        self.deployment_host = Some(host.into());
        self
    }

    /// Add one origin to the allow-list.
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.extra_allowed_origins.push(origin.into());
        self
    }

    pub fn include_localhost(mut self, include: bool) -> Self {
        self.include_localhost = Some(include);
        self
    }

    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn max_counter_entries(mut self, max: usize) -> Self {
        self.max_counter_entries = Some(max);
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<GuardConfig, ConfigError> {
        let defaults = GuardConfig::default();

        let site_url = non_empty(self.site_url);
        if let Some(site) = &site_url {
            normalize_origin("site_url", site)?;
        }
        let deployment_host = non_empty(self.deployment_host);
        if let Some(host) = &deployment_host {
            normalize_origin("deployment_host", &format!("https://{}", host))?;
        }
        let mut extra_allowed_origins = Vec::with_capacity(self.extra_allowed_origins.len());
        for origin in self.extra_allowed_origins {
            if let Some(origin) = non_empty(Some(origin)) {
                normalize_origin("allowed_origins", &origin)?;
                extra_allowed_origins.push(origin);
            }
        }
        let redis_url = non_empty(self.redis_url);
        if let Some(url) = &redis_url {
            Url::parse(url).map_err(|_| ConfigError::InvalidUrl {
                name: "redis_url",
                value: url.clone(),
            })?;
        }

        let max_counter_entries = self
            .max_counter_entries
            .unwrap_or(defaults.max_counter_entries);
        if max_counter_entries == 0 {
            return Err(ConfigError::ZeroMaxEntries);
        }
        let sweep_interval = self.sweep_interval.unwrap_or(defaults.sweep_interval);
        if sweep_interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval);
        }

        Ok(GuardConfig {
            cron_secret: self.cron_secret.and_then(SharedSecret::new),
            site_url,
            deployment_host,
            extra_allowed_origins,
            include_localhost: self.include_localhost.unwrap_or(defaults.include_localhost),
            redis_url,
            max_counter_entries,
            sweep_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GuardConfig::builder().build().unwrap();
        assert!(config.cron_secret.is_none());
        assert_eq!(config.max_counter_entries, 10_000);
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.allowed_origins(), vec![LOCAL_DEV_ORIGIN]);
    }

    #[test]
    fn test_from_lookup() {
        let config = GuardConfig::from_lookup(lookup(&[
            ("CRON_SECRET", "s3cret"),
            ("NEXT_PUBLIC_SITE_URL", "https://portal.example.com/"),
            ("VERCEL_URL", "portal-abc.vercel.app"),
            ("ALLOWED_ORIGINS", "https://admin.example.com, ,https://portal.example.com"),
            ("GUARD_MAX_COUNTER_ENTRIES", "500"),
            ("GUARD_SWEEP_INTERVAL_SECS", "5"),
        ]))
        .unwrap();

        assert!(config
            .cron_secret
            .as_ref()
            .unwrap()
            .verify_bearer(Some("Bearer s3cret")));
        assert_eq!(config.max_counter_entries, 500);
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(
            config.allowed_origins(),
            vec![
                "https://portal.example.com",
                "https://portal-abc.vercel.app",
                "https://admin.example.com",
                "http://localhost:3000",
            ]
        );
    }

    #[test]
    fn test_site_url_alias_and_empty_values() {
        let config = GuardConfig::from_lookup(lookup(&[
            ("CRON_SECRET", ""),
            ("NEXT_PUBLIC_SITE_URL", "  "),
            ("SITE_URL", "https://alias.example.com"),
        ]))
        .unwrap();

        assert!(config.cron_secret.is_none());
        assert_eq!(config.site_url.as_deref(), Some("https://alias.example.com"));
    }

    #[test]
    fn test_invalid_number() {
        let err = GuardConfig::from_lookup(lookup(&[("GUARD_MAX_COUNTER_ENTRIES", "lots")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                name: "GUARD_MAX_COUNTER_ENTRIES",
                value: "lots".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_origin() {
        let err = GuardConfig::builder().allow_origin("not a url").build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { name: "allowed_origins", .. }));
    }

    #[test]
    fn test_zero_values_rejected() {
        assert_eq!(
            GuardConfig::builder().max_counter_entries(0).build(),
            Err(ConfigError::ZeroMaxEntries)
        );
        assert_eq!(
            GuardConfig::builder().sweep_interval(Duration::ZERO).build(),
            Err(ConfigError::ZeroSweepInterval)
        );
    }

    #[test]
    fn test_from_toml() {
        let config = GuardConfig::from_toml_str(
            r#"
            cron_secret = "abc"
            deployment_host = "preview.example.dev"
            allowed_origins = ["https://admin.example.com"]
            include_localhost = false
            max_counter_entries = 42
            sweep_interval_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.max_counter_entries, 42);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(
            config.allowed_origins(),
            vec!["https://preview.example.dev", "https://admin.example.com"]
        );
    }

    #[test]
    fn test_toml_rejects_unknown_keys() {
        let err = GuardConfig::from_toml_str("site = 1").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidToml(_)));
    }

    #[test]
    fn test_secret_not_printed() {
        let config = GuardConfig::builder().cron_secret("hunter2").build().unwrap();
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
