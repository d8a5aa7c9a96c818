//! Fixed-window rate limiting per action class.
//!
//! A [`RateLimiter`] owns one [`WindowPolicy`] and a key prefix. Checking an
//! identity increments its counter in the shared [`CounterStore`] and turns
//! the post-increment entry into a [`RateLimitDecision`].

use crate::application::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, CounterStore, Translator};
use crate::domain::counter::RateLimitDecision;
use crate::domain::policy::WindowPolicy;
use crate::domain::sanitize::sanitize_email;
use std::fmt;
use std::panic;
use std::sync::Arc;
use std::time::Duration;

/// Rate limiter for one action class.
#[derive(Clone)]
pub struct RateLimiter {
    prefix: String,
    policy: WindowPolicy,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("prefix", &self.prefix)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter whose counters live under `{prefix}:` in `store`.
    pub fn new(
        prefix: impl Into<String>,
        policy: WindowPolicy,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let prefix = prefix.into();
        let circuit_breaker = CircuitBreaker::with_clock(CircuitBreakerConfig::default(), Arc::clone(&clock))
            .named(prefix.clone());
        Self {
            prefix,
            policy,
            store,
            clock,
            metrics: Metrics::new(),
            circuit_breaker: Arc::new(circuit_breaker),
        }
    }

    /// Share a metrics tracker with other gates.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Share a circuit breaker with other limiters on the same store.
    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    /// Count one request for `identity` and decide whether it may proceed.
    ///
    /// # Fail-Safe Behavior
    /// If the store panics, or the circuit breaker is open after repeated
    /// panics, the request is allowed without being counted.
    pub fn check(&self, identity: &str) -> RateLimitDecision {
        let now = self.clock.now();

        if !self.circuit_breaker.allow_request() {
            self.metrics.record_allowed();
            return RateLimitDecision::allow_unmetered(&self.policy, now);
        }

        let key = self.key(identity);
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            self.store.increment(&key, self.policy.window(), now)
        }));

        let decision = match result {
            Ok(entry) => {
                self.circuit_breaker.record_success();
                RateLimitDecision::from_entry(&entry, &self.policy, now)
            }
            Err(_) => {
                self.circuit_breaker.record_failure();
                tracing::warn!(action = %self.prefix, "Counter store panicked, allowing request");
                RateLimitDecision::allow_unmetered(&self.policy, now)
            }
        };

        if decision.success {
            self.metrics.record_allowed();
        } else {
            self.metrics.record_limited();
            tracing::debug!(
                action = %self.prefix,
                retry_after = decision.retry_after_secs(),
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Forget the counter for `identity`.
    pub fn reset(&self, identity: &str) {
        self.store.reset(&self.key(identity));
    }

    /// Store key for `identity`.
    pub fn key(&self, identity: &str) -> String {
        format!("{}:{}", self.prefix, identity)
    }

    /// Key prefix naming this limiter's action class.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Window length and request limit.
    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    /// Counters this limiter reports to.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Breaker guarding store access; while open, checks are allowed unmetered.
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }
}

/// A named limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPreset {
    pub prefix: &'static str,
    pub policy: WindowPolicy,
}

impl RateLimitPreset {
    /// Login and signup attempts: 5 per 15 minutes.
    pub const AUTH: Self = Self {
        prefix: "auth",
        policy: WindowPolicy::preset(5, Duration::from_secs(15 * 60)),
    };
    /// General API calls: 60 per minute.
    pub const API: Self = Self {
        prefix: "api",
        policy: WindowPolicy::preset(60, Duration::from_secs(60)),
    };
    /// File uploads: 10 per hour.
    pub const UPLOAD: Self = Self {
        prefix: "upload",
        policy: WindowPolicy::preset(10, Duration::from_secs(60 * 60)),
    };
    /// Password reset and account changes: 3 per hour.
    pub const PASSWORD_RESET: Self = Self {
        prefix: "pwd_reset",
        policy: WindowPolicy::preset(3, Duration::from_secs(60 * 60)),
    };
    /// Share links: 20 per hour.
    pub const SHARE: Self = Self {
        prefix: "share",
        policy: WindowPolicy::preset(20, Duration::from_secs(60 * 60)),
    };

    /// Build a limiter for this preset.
    pub fn limiter(&self, store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> RateLimiter {
        RateLimiter::new(self.prefix, self.policy, store, clock)
    }
}

/// Action classes covered by [`RateLimiters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    Auth,
    Api,
    Upload,
    PasswordReset,
    Share,
}

impl ActionClass {
    pub fn as_str(&self) -> &'static str {
        self.preset().prefix
    }

    pub fn preset(&self) -> RateLimitPreset {
        match self {
            ActionClass::Auth => RateLimitPreset::AUTH,
            ActionClass::Api => RateLimitPreset::API,
            ActionClass::Upload => RateLimitPreset::UPLOAD,
            ActionClass::PasswordReset => RateLimitPreset::PASSWORD_RESET,
            ActionClass::Share => RateLimitPreset::SHARE,
        }
    }
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The portal's standard limiters, sharing one store, metrics and breaker.
#[derive(Debug, Clone)]
pub struct RateLimiters {
    pub auth: RateLimiter,
    pub api: RateLimiter,
    pub upload: RateLimiter,
    pub password_reset: RateLimiter,
    pub share: RateLimiter,
}

impl RateLimiters {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, metrics: Metrics) -> Self {
        let breaker = Arc::new(
            CircuitBreaker::with_clock(CircuitBreakerConfig::default(), Arc::clone(&clock))
                .named("rate_limiters"),
        );
        let build = |preset: RateLimitPreset| {
            preset
                .limiter(Arc::clone(&store), Arc::clone(&clock))
                .with_metrics(metrics.clone())
                .with_circuit_breaker(Arc::clone(&breaker))
        };
        Self {
            auth: build(RateLimitPreset::AUTH),
            api: build(RateLimitPreset::API),
            upload: build(RateLimitPreset::UPLOAD),
            password_reset: build(RateLimitPreset::PASSWORD_RESET),
            share: build(RateLimitPreset::SHARE),
        }
    }

    /// Limiter for an action class.
    pub fn get(&self, class: ActionClass) -> &RateLimiter {
        match class {
            ActionClass::Auth => &self.auth,
            ActionClass::Api => &self.api,
            ActionClass::Upload => &self.upload,
            ActionClass::PasswordReset => &self.password_reset,
            ActionClass::Share => &self.share,
        }
    }

    /// Limiter key for a login attempt: `email:ip`, or the email alone.
    ///
    /// ```
    /// use portal_guard::RateLimiters;
    ///
    /// assert_eq!(
    ///     RateLimiters::login_key(" User@Example.com ", Some("203.0.113.5")),
    ///     "user@example.com:203.0.113.5"
    /// );
    /// assert_eq!(RateLimiters::login_key("user@example.com", None), "user@example.com");
    /// ```
    pub fn login_key(email: &str, ip: Option<&str>) -> String {
        let email = sanitize_email(email);
        match ip.map(str::trim).filter(|ip| !ip.is_empty()) {
            Some(ip) => format!("{}:{}", email, ip),
            None => email,
        }
    }
}

/// Translation key and parameters for a "try again later" message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAfterMessage {
    pub key: &'static str,
    pub param: &'static str,
    pub value: u64,
}

impl RetryAfterMessage {
    /// Seconds below one minute, whole minutes (rounded up) otherwise.
    pub fn new(retry_after_secs: u64) -> Self {
        if retry_after_secs < 60 {
            Self {
                key: "errors.rateLimitSeconds",
                param: "seconds",
                value: retry_after_secs,
            }
        } else {
            Self {
                key: "errors.rateLimitMinutes",
                param: "minutes",
                value: retry_after_secs.div_ceil(60),
            }
        }
    }

    /// Render through a translator.
    pub fn render(&self, translator: &dyn Translator) -> String {
        translator.translate(self.key, &[(self.param, self.value.to_string())])
    }
}

/// Render a rate limit rejection for the user.
pub fn format_rate_limit_error(retry_after_secs: u64, translator: &dyn Translator) -> String {
    RetryAfterMessage::new(retry_after_secs).render(translator)
}
