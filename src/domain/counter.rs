//! Per-key counter state and the decisions derived from it.
//!
//! [`CounterEntry`] backs rate limiting, [`LockoutEntry`] backs account
//! lockout. Both are plain values; atomicity is the store's job.

use crate::domain::policy::{LockoutPolicy, WindowPolicy};
use std::time::{Duration, Instant};

/// Request count within one fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    /// Requests observed in the current window, including the one that opened it
    pub count: u32,
    /// When the current window opened
    pub window_start: Instant,
    /// Window length the entry was opened with
    pub window: Duration,
}

impl CounterEntry {
    /// Open a fresh window containing one request.
    pub fn new(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            window_start: now,
            window,
        }
    }

    /// When the current window closes.
    pub fn reset_at(&self) -> Instant {
        self.window_start + self.window
    }

    /// Whether the window has closed at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.reset_at()
    }

    /// Count one request: reopen the window if it closed, otherwise increment.
    pub fn observe(&mut self, now: Instant, window: Duration) {
        if self.is_expired(now) {
            *self = Self::new(now, window);
        } else {
            self.count = self.count.saturating_add(1);
        }
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub success: bool,
    /// Configured limit for the action class
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// When the current window closes
    pub reset_at: Instant,
    /// How long to wait before retrying; zero when `success` is true
    pub retry_after: Duration,
}

impl RateLimitDecision {
    /// Derive a decision from the post-increment entry.
    pub fn from_entry(entry: &CounterEntry, policy: &WindowPolicy, now: Instant) -> Self {
        let reset_at = entry.reset_at();
        if entry.count <= policy.limit() {
            Self {
                success: true,
                limit: policy.limit(),
                remaining: policy.limit() - entry.count,
                reset_at,
                retry_after: Duration::ZERO,
            }
        } else {
            Self {
                success: false,
                limit: policy.limit(),
                remaining: 0,
                reset_at,
                retry_after: reset_at.saturating_duration_since(now),
            }
        }
    }

    /// Decision used when the limiter fails open.
    pub fn allow_unmetered(policy: &WindowPolicy, now: Instant) -> Self {
        Self {
            success: true,
            limit: policy.limit(),
            remaining: policy.limit(),
            reset_at: now + policy.window(),
            retry_after: Duration::ZERO,
        }
    }

    /// Whole seconds until retry, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        ceil_secs(self.retry_after)
    }

    /// Standard rate limit response headers.
    ///
    /// `X-RateLimit-Reset` is a unix timestamp in seconds. `Retry-After` is
    /// only present on rejection.
    pub fn headers(&self, now: Instant) -> Vec<(&'static str, String)> {
        let until_reset = self.reset_at.saturating_duration_since(now);
        let reset_unix = chrono::Utc::now().timestamp() + ceil_secs(until_reset) as i64;

        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", reset_unix.to_string()),
        ];
        if !self.success {
            headers.push(("Retry-After", self.retry_after_secs().to_string()));
        }
        headers
    }
}

/// Consecutive failed logins for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutEntry {
    /// Failures since the last success or reset
    pub failed_attempts: u32,
    /// Set once `failed_attempts` reaches the policy threshold
    pub locked_until: Option<Instant>,
    /// Time of the most recent failure
    pub last_attempt: Instant,
}

impl LockoutEntry {
    /// Entry with no failures.
    pub fn new(now: Instant) -> Self {
        Self {
            failed_attempts: 0,
            locked_until: None,
            last_attempt: now,
        }
    }

    /// Whether a lock is active at `now`.
    pub fn is_locked(&self, now: Instant) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// Whether the failure history has aged out under `policy`.
    pub fn is_stale(&self, now: Instant, policy: &LockoutPolicy) -> bool {
        !self.is_locked(now) && now.saturating_duration_since(self.last_attempt) > policy.reset_after()
    }

    /// Count one failed login and recompute the lock.
    pub fn record_failure(&mut self, now: Instant, policy: &LockoutPolicy) -> LockoutStatus {
        if self.is_stale(now, policy) {
            *self = Self::new(now);
        }
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.last_attempt = now;
        self.locked_until = policy
            .duration_for(self.failed_attempts)
            .map(|duration| now + duration);
        self.status(now)
    }

    /// Read-only view at `now`. An elapsed lock reads as unlocked.
    pub fn status(&self, now: Instant) -> LockoutStatus {
        match self.locked_until {
            Some(until) if until > now => LockoutStatus {
                is_locked: true,
                remaining_minutes: ceil_minutes(until - now),
                failed_attempts: self.failed_attempts,
            },
            _ => LockoutStatus {
                is_locked: false,
                remaining_minutes: 0,
                failed_attempts: self.failed_attempts,
            },
        }
    }
}

/// Lockout state reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockoutStatus {
    /// Whether login attempts must be refused
    pub is_locked: bool,
    /// Minutes until the lock lifts, rounded up
    pub remaining_minutes: u64,
    /// Failures currently on record
    pub failed_attempts: u32,
}

impl LockoutStatus {
    /// Status for an identity with no history.
    pub fn unlocked() -> Self {
        Self::default()
    }
}

pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    let millis = duration.as_millis() as u64;
    millis.div_ceil(1000)
}

pub(crate) fn ceil_minutes(duration: Duration) -> u64 {
    let millis = duration.as_millis() as u64;
    millis.div_ceil(60_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_entry_window() {
        let start = Instant::now();
        let window = Duration::from_secs(60);
        let mut entry = CounterEntry::new(start, window);
        assert_eq!(entry.count, 1);

        entry.observe(start + Duration::from_secs(10), window);
        assert_eq!(entry.count, 2);
        assert_eq!(entry.window_start, start);

        entry.observe(start + Duration::from_secs(60), window);
        assert_eq!(entry.count, 1);
        assert_eq!(entry.window_start, start + Duration::from_secs(60));
    }

    #[test]
    fn test_decision_from_entry() {
        let now = Instant::now();
        let policy = WindowPolicy::new(2, Duration::from_secs(60)).unwrap();
        let mut entry = CounterEntry::new(now, policy.window());

        let first = RateLimitDecision::from_entry(&entry, &policy, now);
        assert!(first.success);
        assert_eq!(first.remaining, 1);

        entry.observe(now, policy.window());
        entry.observe(now, policy.window());
        let later = now + Duration::from_millis(500);
        let rejected = RateLimitDecision::from_entry(&entry, &policy, later);
        assert!(!rejected.success);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.retry_after, Duration::from_millis(59_500));
        assert_eq!(rejected.retry_after_secs(), 60);
    }

    #[test]
    fn test_headers() {
        let now = Instant::now();
        let policy = WindowPolicy::new(1, Duration::from_secs(30)).unwrap();
        let mut entry = CounterEntry::new(now, policy.window());

        let ok = RateLimitDecision::from_entry(&entry, &policy, now).headers(now);
        assert_eq!(ok.len(), 3);
        assert_eq!(ok[0], ("X-RateLimit-Limit", "1".to_string()));
        assert_eq!(ok[1], ("X-RateLimit-Remaining", "0".to_string()));

        entry.observe(now, policy.window());
        let limited = RateLimitDecision::from_entry(&entry, &policy, now).headers(now);
        assert_eq!(limited.len(), 4);
        assert_eq!(limited[3], ("Retry-After", "30".to_string()));
    }

    #[test]
    fn test_lockout_entry_locks_at_threshold() {
        let now = Instant::now();
        let policy = LockoutPolicy::single(3, Duration::from_secs(15 * 60)).unwrap();
        let mut entry = LockoutEntry::new(now);

        assert!(!entry.record_failure(now, &policy).is_locked);
        assert!(!entry.record_failure(now, &policy).is_locked);
        assert!(entry.locked_until.is_none());

        let status = entry.record_failure(now, &policy);
        assert!(status.is_locked);
        assert_eq!(status.remaining_minutes, 15);
        assert_eq!(status.failed_attempts, 3);
    }

    #[test]
    fn test_lockout_lazy_expiry() {
        let now = Instant::now();
        let policy = LockoutPolicy::single(1, Duration::from_secs(60)).unwrap();
        let mut entry = LockoutEntry::new(now);
        entry.record_failure(now, &policy);

        let status = entry.status(now + Duration::from_secs(61));
        assert!(!status.is_locked);
        assert_eq!(status.failed_attempts, 1);
        assert!(entry.locked_until.is_some());
    }

    #[test]
    fn test_lockout_history_resets_after_inactivity() {
        let now = Instant::now();
        let policy = LockoutPolicy::progressive();
        let mut entry = LockoutEntry::new(now);
        for _ in 0..4 {
            entry.record_failure(now, &policy);
        }

        let much_later = now + Duration::from_secs(2 * 60 * 60);
        let status = entry.record_failure(much_later, &policy);
        assert_eq!(status.failed_attempts, 1);
        assert!(!status.is_locked);
    }

    #[test]
    fn test_remaining_minutes_rounds_up() {
        assert_eq!(ceil_minutes(Duration::from_secs(61)), 2);
        assert_eq!(ceil_minutes(Duration::from_secs(60)), 1);
        assert_eq!(ceil_secs(Duration::from_millis(1)), 1);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }
}
