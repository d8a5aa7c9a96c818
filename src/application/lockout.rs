//! Account lockout after repeated failed logins.

use crate::application::audit::AuditLogger;
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, CounterStore};
use crate::domain::audit::{AuditEvent, AuditEventType, Outcome};
use crate::domain::counter::{ceil_minutes, LockoutStatus};
use crate::domain::policy::LockoutPolicy;
use crate::domain::sanitize::{mask_prefix, sanitize_email};
use serde_json::{json, Map};
use std::fmt;
use std::sync::Arc;

/// Tracks consecutive failed logins per identity and locks progressively.
///
/// An identity is the normalized email, with `:ip` appended when the client
/// address is known. Every failure at or above the policy threshold locks
/// the identity again for the tier's duration. A successful login clears the
/// history.
///
/// # Examples
///
/// ```
/// use portal_guard::application::audit::AuditLogger;
/// use portal_guard::application::lockout::AccountLockoutTracker;
/// use portal_guard::domain::policy::LockoutPolicy;
/// use portal_guard::infrastructure::clock::SystemClock;
/// use portal_guard::infrastructure::storage::MemoryCounterStore;
/// use std::sync::Arc;
///
/// let tracker = AccountLockoutTracker::new(
///     Arc::new(MemoryCounterStore::new()),
///     Arc::new(SystemClock::new()),
///     LockoutPolicy::progressive(),
///     AuditLogger::new(),
/// );
///
/// for _ in 0..5 {
///     tracker.record_failed_login("user@example.com", None);
/// }
/// let status = tracker.check_account_lockout("user@example.com", None);
/// assert!(status.is_locked);
/// assert_eq!(status.remaining_minutes, 5);
///
/// tracker.record_successful_login("user@example.com", None);
/// assert!(!tracker.check_account_lockout("user@example.com", None).is_locked);
/// ```
#[derive(Clone)]
pub struct AccountLockoutTracker {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    policy: LockoutPolicy,
    audit: AuditLogger,
    metrics: Metrics,
}

impl fmt::Debug for AccountLockoutTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountLockoutTracker")
            .field("policy", &self.policy)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl AccountLockoutTracker {
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        policy: LockoutPolicy,
        audit: AuditLogger,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            audit,
            metrics: Metrics::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Lowercased, trimmed email with `:ip` appended when known.
    pub fn normalize_identity(email: &str, ip: Option<&str>) -> String {
        let email = sanitize_email(email);
        match ip.map(str::trim).filter(|ip| !ip.is_empty()) {
            Some(ip) => format!("{}:{}", email, ip),
            None => email,
        }
    }

    /// Current lockout state. Never writes; an elapsed or stale entry reads
    /// as unlocked.
    pub fn check_account_lockout(&self, email: &str, ip: Option<&str>) -> LockoutStatus {
        let identity = Self::normalize_identity(email, ip);
        let now = self.clock.now();

        match self.store.lockout_entry(&identity) {
            Some(entry) if !entry.is_stale(now, &self.policy) => entry.status(now),
            _ => LockoutStatus::unlocked(),
        }
    }

    /// Count a failed login and lock the identity once the threshold is met.
    pub fn record_failed_login(&self, email: &str, ip: Option<&str>) -> LockoutStatus {
        let identity = Self::normalize_identity(email, ip);
        let now = self.clock.now();
        let status = self.store.record_failure(&identity, &self.policy, now);

        if status.is_locked {
            self.metrics.record_lockout();
            let lockout_minutes = self
                .policy
                .duration_for(status.failed_attempts)
                .map(ceil_minutes)
                .unwrap_or(status.remaining_minutes);

            tracing::debug!(
                failed_attempts = status.failed_attempts,
                lockout_minutes,
                "Account locked"
            );

            let mut metadata = Map::new();
            metadata.insert("identity".into(), json!(mask_prefix(&sanitize_email(email), 3)));
            metadata.insert("failed_attempts".into(), json!(status.failed_attempts));
            metadata.insert("lockout_minutes".into(), json!(lockout_minutes));
            self.audit.log(
                &AuditEvent::builder(
                    AuditEventType::SecuritySuspiciousActivity,
                    format!(
                        "Account locked after {} failed attempts",
                        status.failed_attempts
                    ),
                    Outcome::Failure,
                )
                .ip_address(ip)
                .metadata(metadata)
                .build(),
            );
        }

        status
    }

    /// Clear all failures for the identity.
    pub fn record_successful_login(&self, email: &str, ip: Option<&str>) {
        let identity = Self::normalize_identity(email, ip);
        self.store.clear_lockout(&identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::audit_sink::NoopAuditSink;
    use crate::infrastructure::mocks::{MemoryAuditSink, MockClock};
    use crate::infrastructure::storage::MemoryCounterStore;
    use std::time::Duration;

    const EMAIL: &str = "user@example.com";

    fn tracker() -> (AccountLockoutTracker, MockClock, MemoryAuditSink) {
        let clock = MockClock::starting_now();
        let sink = MemoryAuditSink::new();
        let audit = AuditLogger::new()
            .with_primary_sink(Arc::new(NoopAuditSink))
            .with_external_sink(Arc::new(sink.clone()));
        let tracker = AccountLockoutTracker::new(
            Arc::new(MemoryCounterStore::new()),
            Arc::new(clock.clone()),
            LockoutPolicy::progressive(),
            audit,
        );
        (tracker, clock, sink)
    }

    #[test]
    fn test_locks_at_threshold() {
        let (tracker, _clock, _sink) = tracker();

        for attempt in 1..5 {
            let status = tracker.record_failed_login(EMAIL, None);
            assert!(!status.is_locked);
            assert_eq!(status.failed_attempts, attempt);
        }

        let status = tracker.record_failed_login(EMAIL, None);
        assert!(status.is_locked);
        assert_eq!(status.remaining_minutes, 5);

        let checked = tracker.check_account_lockout(EMAIL, None);
        assert!(checked.is_locked);
        assert_eq!(checked.failed_attempts, 5);
    }

    #[test]
    fn test_success_resets() {
        let (tracker, _clock, _sink) = tracker();
        for _ in 0..5 {
            tracker.record_failed_login(EMAIL, None);
        }

        tracker.record_successful_login(EMAIL, None);

        assert_eq!(
            tracker.check_account_lockout(EMAIL, None),
            LockoutStatus::unlocked()
        );
    }

    #[test]
    fn test_lock_expires_lazily() {
        let (tracker, clock, _sink) = tracker();
        for _ in 0..5 {
            tracker.record_failed_login(EMAIL, None);
        }

        clock.advance_minutes(5);

        let status = tracker.check_account_lockout(EMAIL, None);
        assert!(!status.is_locked);
        assert_eq!(status.failed_attempts, 5);
    }

    #[test]
    fn test_progressive_tiers() {
        let (tracker, _clock, _sink) = tracker();

        let mut last = LockoutStatus::unlocked();
        for _ in 0..10 {
            last = tracker.record_failed_login(EMAIL, None);
        }
        assert_eq!(last.remaining_minutes, 30);

        for _ in 0..5 {
            last = tracker.record_failed_login(EMAIL, None);
        }
        assert_eq!(last.remaining_minutes, 60);
    }

    #[test]
    fn test_stale_history_reads_as_unlocked() {
        let (tracker, clock, _sink) = tracker();
        for _ in 0..3 {
            tracker.record_failed_login(EMAIL, None);
        }

        clock.advance(Duration::from_secs(61 * 60));

        assert_eq!(tracker.check_account_lockout(EMAIL, None).failed_attempts, 0);
        assert_eq!(tracker.record_failed_login(EMAIL, None).failed_attempts, 1);
    }

    #[test]
    fn test_identity_includes_ip() {
        let (tracker, _clock, _sink) = tracker();
        for _ in 0..5 {
            tracker.record_failed_login(EMAIL, Some("203.0.113.5"));
        }

        assert!(tracker.check_account_lockout(" USER@example.com ", Some("203.0.113.5")).is_locked);
        assert!(!tracker.check_account_lockout(EMAIL, Some("198.51.100.1")).is_locked);
        assert!(!tracker.check_account_lockout(EMAIL, None).is_locked);
    }

    #[test]
    fn test_lock_emits_masked_audit_event() {
        let (tracker, _clock, sink) = tracker();
        let metrics = Metrics::new();
        let tracker = tracker.with_metrics(metrics.clone());

        for _ in 0..5 {
            tracker.record_failed_login(EMAIL, Some("203.0.113.5"));
        }

        let events = sink.of_type(AuditEventType::SecuritySuspiciousActivity);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.action(), "Account locked after 5 failed attempts");
        assert_eq!(event.metadata()["identity"], json!("use***"));
        assert_eq!(event.metadata()["failed_attempts"], json!(5));
        assert_eq!(event.metadata()["lockout_minutes"], json!(5));
        assert_eq!(metrics.snapshot().lockouts_triggered, 1);
    }

    #[test]
    fn test_normalize_identity() {
        assert_eq!(
            AccountLockoutTracker::normalize_identity(" A@B.com ", Some(" 1.2.3.4 ")),
            "a@b.com:1.2.3.4"
        );
        assert_eq!(AccountLockoutTracker::normalize_identity("a@b.com", Some("")), "a@b.com");
    }
}
