//! One entry point wiring every gate to a shared store, clock, audit logger
//! and metrics tracker.

use crate::application::audit::AuditLogger;
use crate::application::limiter::{ActionClass, RateLimiters};
use crate::application::lockout::AccountLockoutTracker;
use crate::application::metrics::Metrics;
use crate::application::origin::{OriginGuard, RequestContext};
use crate::application::ports::{AuditSink, Clock, CounterStore};
use crate::domain::audit::{AuditEvent, AuditEventType, Outcome};
use crate::domain::counter::{LockoutStatus, RateLimitDecision};
use crate::domain::error::ErrorCode;
use crate::domain::policy::LockoutPolicy;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::GuardConfig;
use crate::infrastructure::storage::MemoryCounterStore;
use std::fmt;
use std::sync::Arc;

/// Errors that can occur when building a [`SecurityGate`].
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    /// Counter cap must be greater than zero
    ZeroMaxEntries,
    /// Sweep interval must be greater than zero
    ZeroSweepInterval,
    /// The Redis counter store could not be reached
    #[cfg(feature = "redis-storage")]
    Redis(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::ZeroMaxEntries => write!(f, "max_counter_entries must be greater than 0"),
            BuildError::ZeroSweepInterval => write!(f, "sweep_interval must be greater than 0"),
            #[cfg(feature = "redis-storage")]
            BuildError::Redis(e) => write!(f, "redis counter store unavailable: {}", e),
        }
    }
}

impl std::error::Error for BuildError {}

/// Builder for [`SecurityGate`].
#[derive(Default)]
pub struct SecurityGateBuilder {
    config: GuardConfig,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn CounterStore>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    primary_audit_sink: Option<Arc<dyn AuditSink>>,
    lockout_policy: LockoutPolicy,
}

impl fmt::Debug for SecurityGateBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityGateBuilder")
            .field("config", &self.config)
            .field("lockout_policy", &self.lockout_policy)
            .finish_non_exhaustive()
    }
}

impl SecurityGateBuilder {
    pub fn with_config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    /// Time source for windows and lockouts. Defaults to [`SystemClock`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Counter store. Defaults to a [`MemoryCounterStore`] capped at the
    /// configured `max_counter_entries`.
    pub fn with_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Optional sink that receives pseudonymized audit events.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Replace the always-on `tracing` audit sink.
    pub fn with_primary_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.primary_audit_sink = Some(sink);
        self
    }

    pub fn with_lockout_policy(mut self, policy: LockoutPolicy) -> Self {
        self.lockout_policy = policy;
        self
    }

    /// Build the gate.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn build(self) -> Result<SecurityGate, BuildError> {
        if self.config.max_counter_entries == 0 {
            return Err(BuildError::ZeroMaxEntries);
        }
        if self.config.sweep_interval.is_zero() {
            return Err(BuildError::ZeroSweepInterval);
        }

        let metrics = Metrics::new();
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let store = self.store.unwrap_or_else(|| {
            Arc::new(
                MemoryCounterStore::with_max_entries(self.config.max_counter_entries)
                    .with_metrics(metrics.clone()),
            )
        });

        let mut audit = AuditLogger::new().with_metrics(metrics.clone());
        if let Some(sink) = self.primary_audit_sink {
            audit = audit.with_primary_sink(sink);
        }
        if let Some(sink) = self.audit_sink {
            audit = audit.with_external_sink(sink);
        }

        let limiters = RateLimiters::new(Arc::clone(&store), Arc::clone(&clock), metrics.clone());
        let lockout = AccountLockoutTracker::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            self.lockout_policy,
            audit.clone(),
        )
        .with_metrics(metrics.clone());
        let origin = OriginGuard::from_config(&self.config).with_metrics(metrics.clone());

        Ok(SecurityGate {
            config: self.config,
            clock,
            store,
            metrics,
            audit,
            limiters,
            lockout,
            origin,
        })
    }

    /// Build the gate, connecting to `redis_url` when one is configured and
    /// no store was supplied.
    ///
    /// # Errors
    /// Returns `BuildError::Redis` if the connection fails, or any error
    /// [`build`](Self::build) returns.
    #[cfg(feature = "redis-storage")]
    pub async fn build_with_redis(mut self) -> Result<SecurityGate, BuildError> {
        use crate::infrastructure::redis_storage::{RedisCounterStore, RedisStoreConfig};

        if self.store.is_none() {
            if let Some(url) = self.config.redis_url.clone() {
                let config = RedisStoreConfig {
                    fallback_max_entries: self.config.max_counter_entries,
                    ..Default::default()
                };
                let store = RedisCounterStore::connect_with_config(&url, config)
                    .await
                    .map_err(|e| BuildError::Redis(e.to_string()))?;
                self.store = Some(Arc::new(store));
            }
        }
        self.build()
    }
}

/// The request-trust layer for the portal.
///
/// Each `check_*` method is one gate. Gates short-circuit with an
/// [`ErrorCode`]; callers stop processing the request on `Err`.
///
/// # Examples
///
/// ```
/// use portal_guard::{ActionClass, ErrorCode, GuardConfig, RequestContext, SecurityGate};
///
/// let config = GuardConfig::builder()
///     .site_url("https://portal.example.com")
///     .cron_secret("s3cret")
///     .build()
///     .unwrap();
/// let gate = SecurityGate::builder().with_config(config).build().unwrap();
///
/// let ctx = RequestContext::new().with_origin("https://portal.example.com");
/// assert!(gate.check_origin("update_profile", &ctx).is_ok());
///
/// for _ in 0..3 {
///     assert!(gate.check_rate_limit(ActionClass::PasswordReset, "user-1", None).is_ok());
/// }
/// assert_eq!(
///     gate.check_rate_limit(ActionClass::PasswordReset, "user-1", None),
///     Err(ErrorCode::RateLimited)
/// );
///
/// assert!(gate.validate_cron_request(Some("Bearer s3cret")));
/// ```
#[derive(Clone)]
pub struct SecurityGate {
    config: GuardConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn CounterStore>,
    metrics: Metrics,
    audit: AuditLogger,
    limiters: RateLimiters,
    lockout: AccountLockoutTracker,
    origin: OriginGuard,
}

impl fmt::Debug for SecurityGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityGate")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl SecurityGate {
    pub fn builder() -> SecurityGateBuilder {
        SecurityGateBuilder::default()
    }

    /// Reject cross-site mutations with `Forbidden`.
    ///
    /// Rejections are also recorded as audit events.
    pub fn check_origin(&self, action: &str, ctx: &RequestContext) -> Result<(), ErrorCode> {
        match self.origin.enforce_allowed_origin(action, ctx) {
            None => Ok(()),
            Some(code) => {
                let ip = ctx.client_ip();
                self.audit.log(
                    &AuditEvent::builder(
                        AuditEventType::SecurityUnauthorizedAccess,
                        format!("Blocked {} from disallowed origin", action),
                        Outcome::Failure,
                    )
                    .target_id(action)
                    .ip_address(ip.as_deref())
                    .user_agent(ctx.user_agent.as_deref())
                    .meta("origin", ctx.declared_origin().unwrap_or_default())
                    .build(),
                );
                Err(code)
            }
        }
    }

    /// Count one request of `class` for `identity`.
    ///
    /// Rejections are audited with the identity masked.
    pub fn check_rate_limit(
        &self,
        class: ActionClass,
        identity: &str,
        ip: Option<&str>,
    ) -> Result<RateLimitDecision, ErrorCode> {
        let decision = self.limiters.get(class).check(identity);
        if decision.success {
            Ok(decision)
        } else {
            self.audit.rate_limited(identity, class.as_str(), ip);
            Err(ErrorCode::RateLimited)
        }
    }

    /// Gate a login attempt: the auth rate limit on `email:ip`, then the
    /// account lockout.
    pub fn check_login_allowed(
        &self,
        email: &str,
        ip: Option<&str>,
    ) -> Result<LockoutStatus, ErrorCode> {
        let key = RateLimiters::login_key(email, ip);
        self.check_rate_limit(ActionClass::Auth, &key, ip)?;

        let status = self.lockout.check_account_lockout(email, ip);
        if status.is_locked {
            return Err(ErrorCode::AccountLocked);
        }
        Ok(status)
    }

    /// Record a rejected login. Returns the updated lockout state.
    pub fn record_login_failure(&self, email: &str, reason: &str, ip: Option<&str>) -> LockoutStatus {
        self.audit.login_failure(email, reason, ip);
        self.lockout.record_failed_login(email, ip)
    }

    /// Record a successful login and clear the failure history.
    pub fn record_login_success(&self, user_id: &str, email: &str, ip: Option<&str>) {
        self.lockout.record_successful_login(email, ip);
        self.audit.login_success(user_id, ip);
    }

    /// Whether a scheduled-job request carries the configured bearer secret.
    ///
    /// Always `false` when no secret is configured.
    pub fn validate_cron_request(&self, authorization: Option<&str>) -> bool {
        let valid = self
            .config
            .cron_secret
            .as_ref()
            .is_some_and(|secret| secret.verify_bearer(authorization));

        if !valid {
            tracing::warn!("Rejected scheduled job request");
            self.audit.log(
                &AuditEvent::builder(
                    AuditEventType::SecurityUnauthorizedAccess,
                    "Rejected scheduled job request",
                    Outcome::Failure,
                )
                .meta("configured", self.config.cron_secret.is_some())
                .build(),
            );
        }
        valid
    }

    /// Start pruning the store every `sweep_interval`.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    #[cfg(feature = "async")]
    pub fn spawn_sweeper(&self) -> crate::application::sweeper::SweeperHandle {
        crate::application::sweeper::spawn_sweeper(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.config.sweep_interval,
            self.lockout.policy().reset_after(),
        )
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn limiters(&self) -> &RateLimiters {
        &self.limiters
    }

    pub fn lockout(&self) -> &AccountLockoutTracker {
        &self.lockout
    }

    pub fn origin(&self) -> &OriginGuard {
        &self.origin
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Shared counters for every gate.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
