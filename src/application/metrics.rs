//! Counters describing what the guard has decided.
//!
//! Every gate shares one [`Metrics`] handle; clones observe the same values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Decision and failure counters.
///
/// All metrics use relaxed atomics. They are meant for dashboards, not for
/// making further decisions.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    requests_allowed: AtomicU64,
    requests_limited: AtomicU64,
    lockouts_triggered: AtomicU64,
    origin_rejections: AtomicU64,
    audit_events: AtomicU64,
    audit_sink_failures: AtomicU64,
    entries_evicted: AtomicU64,
    store_fallbacks: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_allowed(&self) {
        self.inner.requests_allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_limited(&self) {
        self.inner.requests_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lockout(&self) {
        self.inner.lockouts_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_origin_rejection(&self) {
        self.inner.origin_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_audit_event(&self) {
        self.inner.audit_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sink_failure(&self) {
        self.inner.audit_sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.inner.entries_evicted.fetch_add(1, Ordering::Relaxed);
    }

    #[cfg_attr(not(feature = "redis-storage"), allow(dead_code))]
    pub(crate) fn record_store_fallback(&self) {
        self.inner.store_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests a rate limiter let through.
    pub fn requests_allowed(&self) -> u64 {
        self.inner.requests_allowed.load(Ordering::Relaxed)
    }

    /// Requests a rate limiter refused.
    pub fn requests_limited(&self) -> u64 {
        self.inner.requests_limited.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests_allowed: load(&self.inner.requests_allowed),
            requests_limited: load(&self.inner.requests_limited),
            lockouts_triggered: load(&self.inner.lockouts_triggered),
            origin_rejections: load(&self.inner.origin_rejections),
            audit_events: load(&self.inner.audit_events),
            audit_sink_failures: load(&self.inner.audit_sink_failures),
            entries_evicted: load(&self.inner.entries_evicted),
            store_fallbacks: load(&self.inner.store_fallbacks),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.requests_allowed,
            &inner.requests_limited,
            &inner.lockouts_triggered,
            &inner.origin_rejections,
            &inner.audit_events,
            &inner.audit_sink_failures,
            &inner.entries_evicted,
            &inner.store_fallbacks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Requests a rate limiter let through
    pub requests_allowed: u64,
    /// Requests a rate limiter refused
    pub requests_limited: u64,
    /// Failed logins that started or extended a lock
    pub lockouts_triggered: u64,
    /// Mutations refused by the origin guard
    pub origin_rejections: u64,
    /// Audit events recorded
    pub audit_events: u64,
    /// Audit sink calls that panicked
    pub audit_sink_failures: u64,
    /// Keys evicted from the in-memory store
    pub entries_evicted: u64,
    /// Store operations served by the in-memory fallback
    pub store_fallbacks: u64,
}

impl MetricsSnapshot {
    /// Share of rate-limited requests (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been checked.
    pub fn limited_rate(&self) -> f64 {
        let total = self.total_checked();
        if total == 0 {
            0.0
        } else {
            self.requests_limited as f64 / total as f64
        }
    }

    /// Requests checked by any rate limiter.
    pub fn total_checked(&self) -> u64 {
        self.requests_allowed.saturating_add(self.requests_limited)
    }
}
