//! # portal-guard
//!
//! Request-trust and abuse-prevention primitives for a resident portal.
//!
//! Every mutating action passes through the same gates, in order:
//!
//! 1. **Origin check**: the declared origin must be one of the deployment's own hosts
//! 2. **Rate limiting** and **account lockout**: per-identity counters in a shared store
//! 3. **Sanitization and validation**: untrusted strings and uploads are normalized or rejected
//! 4. **Audit logging**: security-relevant outcomes are recorded with PII redacted
//!
//! Each gate short-circuits with an [`ErrorCode`]. The crate never renders
//! user-facing text; a [`Translator`] does that at the presentation layer.
//!
//! ## Quick Start
//!
//! ```rust
//! use portal_guard::{ErrorCode, GuardConfig, RequestContext, SecurityGate};
//!
//! let config = GuardConfig::builder()
//!     .site_url("https://portal.example.com")
//!     .build()
//!     .unwrap();
//! let gate = SecurityGate::builder().with_config(config).build().unwrap();
//!
//! let ctx = RequestContext::from_headers([
//!     ("origin", "https://portal.example.com"),
//!     ("x-forwarded-for", "203.0.113.5"),
//! ]);
//! let ip = ctx.client_ip();
//!
//! gate.check_origin("login", &ctx).unwrap();
//! match gate.check_login_allowed("user@example.com", ip.as_deref()) {
//!     Ok(_) => { /* verify credentials */ }
//!     Err(ErrorCode::RateLimited) | Err(ErrorCode::AccountLocked) => { /* try later */ }
//!     Err(other) => panic!("unexpected {}", other),
//! }
//! ```
//!
//! ## Rate Limiting
//!
//! Fixed windows per action class. A window opens on the first request for a
//! key and allows `limit` requests until it elapses:
//!
//! | Preset           | Limit | Window | Key prefix  |
//! |------------------|-------|--------|-------------|
//! | `auth`           | 5     | 15 min | `auth`      |
//! | `api`            | 60    | 1 min  | `api`       |
//! | `upload`         | 10    | 1 h    | `upload`    |
//! | `password_reset` | 3     | 1 h    | `pwd_reset` |
//! | `share`          | 20    | 1 h    | `share`     |
//!
//! ```rust
//! use portal_guard::{MemoryCounterStore, Metrics, RateLimiters, SystemClock};
//! use std::sync::Arc;
//!
//! let limiters = RateLimiters::new(
//!     Arc::new(MemoryCounterStore::new()),
//!     Arc::new(SystemClock::new()),
//!     Metrics::new(),
//! );
//!
//! let key = RateLimiters::login_key("user@example.com", Some("203.0.113.5"));
//! let decision = limiters.auth.check(&key);
//! assert!(decision.success);
//! assert_eq!(decision.remaining, 4);
//! ```
//!
//! ## Account Lockout
//!
//! Consecutive failed logins lock an identity progressively: 5 failures for
//! 5 minutes, 10 for 30 minutes, 15 for an hour. History is forgotten after
//! an hour without attempts, and a successful login clears it. See
//! [`LockoutPolicy`] for custom tiers.
//!
//! ## Counter Stores
//!
//! - [`MemoryCounterStore`]: sharded in-memory maps with an LRU entry cap and a
//!   periodic sweep. Correct for single-instance deployments.
//! - `RedisCounterStore` (feature `redis-storage`): atomic Lua scripts with
//!   native key expiry, shared across instances. Falls back to memory while
//!   Redis is failing.
//!
//! ## Audit Logging
//!
//! Audit events are redacted when built: sensitive metadata keys become
//! `[REDACTED]`, long strings are cut and error messages lose emails, UUIDs
//! and token-like runs. The default sink writes one `tracing` event per record
//! on target `portal_guard::audit`:
//!
//! ```rust
//! use portal_guard::AuditLogger;
//!
//! let audit = AuditLogger::new();
//! audit.login_failure("alice@example.com", "invalid credentials", Some("203.0.113.5"));
//! ```
//!
//! An optional external sink receives a pseudonymized copy. With the `async`
//! feature, `ChannelAuditSink` moves delivery off the request path.
//!
//! ## Fail-Safe Operation
//!
//! A failing store or sink never fails the request. Rate limiters allow
//! requests while their circuit breaker is open, and sink panics are caught
//! and counted:
//!
//! ```rust
//! # use portal_guard::{SecurityGate, CircuitState};
//! let gate = SecurityGate::builder().build().unwrap();
//! match gate.limiters().auth.circuit_breaker().state() {
//!     CircuitState::Closed => println!("Normal operation"),
//!     CircuitState::Open => println!("Failing open - counting paused"),
//!     CircuitState::HalfOpen => println!("Testing recovery"),
//! }
//! ```
//!
//! ## Observability
//!
//! ```rust
//! # use portal_guard::SecurityGate;
//! # let gate = SecurityGate::builder().build().unwrap();
//! let snapshot = gate.metrics().snapshot();
//! println!("Limited: {:.2}%", snapshot.limited_rate() * 100.0);
//! println!("Lockouts: {}", snapshot.lockouts_triggered);
//! println!("Origin rejections: {}", snapshot.origin_rejections);
//! ```

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    audit::{AuditEvent, AuditEventBuilder, AuditEventType, Outcome, Severity},
    counter::{CounterEntry, LockoutEntry, LockoutStatus, RateLimitDecision},
    error::{ErrorCode, FieldError, ValidationResult},
    policy::{LockoutPolicy, LockoutTier, PolicyError, WindowPolicy},
    sanitize::{
        is_mock_id, is_valid_uuid, sanitize_email, sanitize_file_name, sanitize_for_storage,
        sanitize_html, strip_html,
    },
    secret::{timing_safe_eq, validate_bearer_secret, SharedSecret},
    upload::{validate_file_content, validate_file_magic_bytes, validate_file_upload},
};

pub use application::{
    audit::{AuditDetails, AuditLogger, ScopedAuditLogger},
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    gate::{BuildError, SecurityGate, SecurityGateBuilder},
    limiter::{
        format_rate_limit_error, ActionClass, RateLimitPreset, RateLimiter, RateLimiters,
        RetryAfterMessage,
    },
    lockout::AccountLockoutTracker,
    metrics::{Metrics, MetricsSnapshot},
    origin::{OriginGuard, RequestContext},
    ports::{AuditSink, Clock, CounterStore, Translator},
};

#[cfg(feature = "async")]
pub use application::{
    dispatcher::{AuditDispatcherHandle, ChannelAuditSink, ShutdownError},
    sweeper::{spawn_sweeper, SweeperHandle},
};

pub use infrastructure::{
    audit_sink::{NoopAuditSink, TracingAuditSink},
    clock::SystemClock,
    config::{ConfigError, GuardConfig, GuardConfigBuilder},
    storage::{MemoryCounterStore, StoreKey},
};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_storage::{RedisCounterStore, RedisStoreConfig};
