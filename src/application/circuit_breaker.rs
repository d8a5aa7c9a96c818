//! Circuit breaker around counter store access.
//!
//! When a store keeps failing, the breaker opens and callers stop touching it
//! for a recovery period. The rate limiter fails open while the breaker is
//! open; the Redis store serves from its in-memory fallback instead.
//!
//! Transitions are logged on target `portal_guard::store`: opening at WARN,
//! closing again at INFO.

use crate::application::ports::Clock;
use crate::infrastructure::clock::SystemClock;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Store calls proceed normally
    Closed = 0,
    /// Store calls are skipped
    Open = 1,
    /// Store calls probe whether the store has recovered
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// When a breaker opens and how long it stays open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive store failures that open the circuit
    pub failure_threshold: u32,
    /// Time after the last failure before a probe is allowed
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Lock-free circuit breaker for one counter store.
#[derive(Debug)]
pub struct CircuitBreaker {
    store: Cow<'static, str>,
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    /// Nanoseconds after `epoch`
    last_failure_at: AtomicU64,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    epoch: Instant,
}

impl CircuitBreaker {
    /// Breaker with the default thresholds, labelled `counter_store`.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Breaker that reads time from `clock`.
    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let epoch = clock.now();
        Self {
            store: Cow::Borrowed("counter_store"),
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            last_failure_at: AtomicU64::new(0),
            config,
            clock,
            epoch,
        }
    }

    /// Label the protected store in transition logs.
    pub fn named(mut self, store: impl Into<Cow<'static, str>>) -> Self {
        self.store = store.into();
        self
    }

    pub fn store(&self) -> &str {
        &self.store
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the protected store should be called.
    ///
    /// An open circuit turns half-open once `recovery_timeout` has passed
    /// since the last failure.
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let since_failure = self
                    .clock
                    .now()
                    .saturating_duration_since(self.last_failure_at());
                if since_failure < self.config.recovery_timeout {
                    return false;
                }

                // Only one caller performs the transition
                let probing = self
                    .state
                    .compare_exchange(
                        CircuitState::Open as u8,
                        CircuitState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok();
                if probing {
                    tracing::debug!(target: "portal_guard::store", store = %self.store, "Probing counter store");
                }
                probing || self.state() == CircuitState::HalfOpen
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        let recovered = self
            .state
            .compare_exchange(
                CircuitState::HalfOpen as u8,
                CircuitState::Closed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if recovered {
            tracing::info!(target: "portal_guard::store", store = %self.store, "Counter store recovered");
        }
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        let elapsed = self
            .clock
            .now()
            .saturating_duration_since(self.epoch)
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX);
        self.last_failure_at.store(elapsed, Ordering::Release);

        let opened = match self.state() {
            CircuitState::HalfOpen => self.transition(CircuitState::HalfOpen, CircuitState::Open),
            CircuitState::Closed if failures >= u64::from(self.config.failure_threshold) => {
                self.transition(CircuitState::Closed, CircuitState::Open)
            }
            _ => false,
        };
        if opened {
            tracing::warn!(
                target: "portal_guard::store",
                store = %self.store,
                failures,
                retry_in_secs = self.config.recovery_timeout.as_secs(),
                "Counter store circuit opened"
            );
        }
    }

    fn transition(&self, from: CircuitState, to: CircuitState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn last_failure_at(&self) -> Instant {
        self.epoch + Duration::from_nanos(self.last_failure_at.load(Ordering::Acquire))
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Force the circuit closed.
    pub fn reset(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
