//! Integration tests for account lockout.

use portal_guard::infrastructure::mocks::{MemoryAuditSink, MockCaptureLayer, MockClock};
use portal_guard::{
    AccountLockoutTracker, AuditEventType, AuditLogger, CounterStore, LockoutPolicy,
    LockoutStatus, LockoutTier, MemoryCounterStore, Metrics, NoopAuditSink,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

const EMAIL: &str = "resident@example.com";

fn tracker_with(policy: LockoutPolicy) -> (AccountLockoutTracker, MockClock, MemoryAuditSink, Metrics) {
    let clock = MockClock::starting_now();
    let sink = MemoryAuditSink::new();
    let metrics = Metrics::new();
    let audit = AuditLogger::new()
        .with_primary_sink(Arc::new(NoopAuditSink))
        .with_external_sink(Arc::new(sink.clone()));
    let store: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
    let tracker = AccountLockoutTracker::new(store, Arc::new(clock.clone()), policy, audit)
        .with_metrics(metrics.clone());
    (tracker, clock, sink, metrics)
}

#[test]
fn test_threshold_locks_and_success_unlocks() {
    let (tracker, _clock, _sink, _metrics) = tracker_with(LockoutPolicy::default());

    for _ in 0..5 {
        tracker.record_failed_login(EMAIL, None);
    }

    let status = tracker.check_account_lockout(EMAIL, None);
    assert!(status.is_locked);
    assert!(status.remaining_minutes > 0);

    tracker.record_successful_login(EMAIL, None);

    let status = tracker.check_account_lockout(EMAIL, None);
    assert!(!status.is_locked);
    assert_eq!(status.failed_attempts, 0);
}

#[test]
fn test_single_tier_policy() {
    let policy = LockoutPolicy::single(3, Duration::from_secs(15 * 60)).unwrap();
    let (tracker, clock, _sink, _metrics) = tracker_with(policy);

    assert!(!tracker.record_failed_login(EMAIL, None).is_locked);
    assert!(!tracker.record_failed_login(EMAIL, None).is_locked);
    let status = tracker.record_failed_login(EMAIL, None);
    assert!(status.is_locked);
    assert_eq!(status.remaining_minutes, 15);

    clock.advance_secs(14 * 60 + 1);
    assert_eq!(tracker.check_account_lockout(EMAIL, None).remaining_minutes, 1);

    clock.advance_secs(60);
    assert!(!tracker.check_account_lockout(EMAIL, None).is_locked);
}

#[test]
fn test_custom_tiers_escalate() {
    let policy = LockoutPolicy::with_tiers(
        vec![
            LockoutTier::new(2, Duration::from_secs(60)),
            LockoutTier::new(4, Duration::from_secs(600)),
        ],
        Duration::from_secs(3600),
    )
    .unwrap();
    let (tracker, _clock, _sink, _metrics) = tracker_with(policy);

    let statuses: Vec<LockoutStatus> = (0..4).map(|_| tracker.record_failed_login(EMAIL, None)).collect();
    let minutes: Vec<u64> = statuses.iter().map(|s| s.remaining_minutes).collect();

    assert_eq!(minutes, vec![0, 1, 1, 10]);
}

#[test]
fn test_check_does_not_write() {
    let (tracker, _clock, _sink, _metrics) = tracker_with(LockoutPolicy::default());

    for _ in 0..10 {
        tracker.check_account_lockout(EMAIL, None);
    }

    assert_eq!(tracker.record_failed_login(EMAIL, None).failed_attempts, 1);
}

#[test]
fn test_concurrent_failures_are_all_counted() {
    let (tracker, _clock, sink, metrics) = tracker_with(LockoutPolicy::default());
    let tracker = Arc::new(tracker);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || tracker.record_failed_login(EMAIL, None))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let status = tracker.check_account_lockout(EMAIL, None);
    assert!(status.is_locked);
    assert_eq!(status.failed_attempts, 8);
    // Failures 5 through 8 each lock again
    assert_eq!(metrics.snapshot().lockouts_triggered, 4);
    assert_eq!(sink.of_type(AuditEventType::SecuritySuspiciousActivity).len(), 4);
}

#[test]
fn test_lock_is_logged_as_critical_audit_record() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let clock = MockClock::starting_now();
    let tracker = AccountLockoutTracker::new(
        Arc::new(MemoryCounterStore::new()),
        Arc::new(clock),
        LockoutPolicy::default(),
        AuditLogger::new(),
    );

    tracing::subscriber::with_default(subscriber, || {
        for _ in 0..5 {
            tracker.record_failed_login(EMAIL, Some("203.0.113.5"));
        }
    });

    let records = capture.for_target("portal_guard::audit");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, Level::ERROR);
    assert_eq!(records[0].field("event_type"), Some("SECURITY_SUSPICIOUS_ACTIVITY"));

    let record = records[0].field("record").unwrap();
    assert!(record.contains("\"identity\":\"res***\""));
    assert!(!record.contains(EMAIL));
}
