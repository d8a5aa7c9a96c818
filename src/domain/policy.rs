//! Throttling and lockout policies.
//!
//! A [`WindowPolicy`] bounds how many requests of one action class a single
//! identity may make per fixed window. A [`LockoutPolicy`] maps a count of
//! consecutive failed logins to a lockout duration.

use std::time::Duration;

/// Error returned when policy configuration is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Request limit must be greater than zero
    ZeroLimit,
    /// Window duration must be greater than zero
    ZeroWindow,
    /// A lockout policy needs at least one tier
    NoTiers,
    /// Tier thresholds must be non-zero and strictly ascending
    UnorderedTiers,
    /// Lockout durations must be greater than zero
    ZeroLockoutDuration,
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::ZeroLimit => write!(f, "limit must be greater than 0"),
            PolicyError::ZeroWindow => write!(f, "window duration must be greater than 0"),
            PolicyError::NoTiers => write!(f, "lockout policy requires at least one tier"),
            PolicyError::UnorderedTiers => {
                write!(f, "lockout thresholds must be non-zero and strictly ascending")
            }
            PolicyError::ZeroLockoutDuration => {
                write!(f, "lockout duration must be greater than 0")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// Fixed-window request budget: `limit` requests per `window`.
///
/// # Example
/// ```
/// use portal_guard::WindowPolicy;
/// use std::time::Duration;
///
/// let policy = WindowPolicy::new(5, Duration::from_secs(900)).unwrap();
/// assert_eq!(policy.limit(), 5);
/// assert!(WindowPolicy::new(0, Duration::from_secs(1)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    limit: u32,
    window: Duration,
}

impl WindowPolicy {
    /// Create a window policy.
    ///
    /// # Errors
    /// Returns `PolicyError::ZeroLimit` or `PolicyError::ZeroWindow` for zero values.
    pub fn new(limit: u32, window: Duration) -> Result<Self, PolicyError> {
        if limit == 0 {
            return Err(PolicyError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(PolicyError::ZeroWindow);
        }
        Ok(Self { limit, window })
    }

    /// Non-validating constructor for built-in presets.
    pub(crate) const fn preset(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// `limit` requests per minute.
    pub fn per_minute(limit: u32) -> Result<Self, PolicyError> {
        Self::new(limit, Duration::from_secs(60))
    }

    /// `limit` requests per hour.
    pub fn per_hour(limit: u32) -> Result<Self, PolicyError> {
        Self::new(limit, Duration::from_secs(3600))
    }

    /// Maximum requests allowed per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }
}

/// One step of a progressive lockout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutTier {
    /// Failed attempts needed to enter this tier
    pub threshold: u32,
    /// How long the identity stays locked once the tier is reached
    pub duration: Duration,
}

impl LockoutTier {
    /// Create a tier.
    pub const fn new(threshold: u32, duration: Duration) -> Self {
        Self {
            threshold,
            duration,
        }
    }
}

/// Maps consecutive failed logins to a lockout duration.
///
/// Tiers are ascending; the highest tier whose threshold has been reached
/// wins. Failure history is forgotten once `reset_after` has elapsed since
/// the last attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutPolicy {
    tiers: Vec<LockoutTier>,
    reset_after: Duration,
}

impl LockoutPolicy {
    /// Default inactivity period after which failures are forgotten.
    pub const DEFAULT_RESET_AFTER: Duration = Duration::from_secs(60 * 60);

    /// Create a policy from explicit tiers.
    ///
    /// # Errors
    /// Returns an error if `tiers` is empty, thresholds are not strictly
    /// ascending, or any duration is zero.
    pub fn with_tiers(tiers: Vec<LockoutTier>, reset_after: Duration) -> Result<Self, PolicyError> {
        if tiers.is_empty() {
            return Err(PolicyError::NoTiers);
        }
        if reset_after.is_zero() {
            return Err(PolicyError::ZeroWindow);
        }
        let mut previous = 0;
        for tier in &tiers {
            if tier.threshold <= previous {
                return Err(PolicyError::UnorderedTiers);
            }
            if tier.duration.is_zero() {
                return Err(PolicyError::ZeroLockoutDuration);
            }
            previous = tier.threshold;
        }
        Ok(Self { tiers, reset_after })
    }

    /// Single-tier policy: lock for `duration` once `threshold` failures occur.
    pub fn single(threshold: u32, duration: Duration) -> Result<Self, PolicyError> {
        Self::with_tiers(
            vec![LockoutTier::new(threshold, duration)],
            Self::DEFAULT_RESET_AFTER,
        )
    }

    /// Progressive default: 5 failures lock for 5 minutes, 10 for 30, 15 for 60.
    pub fn progressive() -> Self {
        Self {
            tiers: vec![
                LockoutTier::new(5, Duration::from_secs(5 * 60)),
                LockoutTier::new(10, Duration::from_secs(30 * 60)),
                LockoutTier::new(15, Duration::from_secs(60 * 60)),
            ],
            reset_after: Self::DEFAULT_RESET_AFTER,
        }
    }

    /// Failed attempts at which the first lockout starts.
    pub fn threshold(&self) -> u32 {
        self.tiers[0].threshold
    }

    /// Inactivity period after which failure history is dropped.
    pub fn reset_after(&self) -> Duration {
        self.reset_after
    }

    /// Configured tiers, ascending.
    pub fn tiers(&self) -> &[LockoutTier] {
        &self.tiers
    }

    /// Lockout duration for a failure count, or `None` below the threshold.
    pub fn duration_for(&self, failed_attempts: u32) -> Option<Duration> {
        self.tiers
            .iter()
            .rev()
            .find(|tier| failed_attempts >= tier.threshold)
            .map(|tier| tier.duration)
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::progressive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_policy_validation() {
        assert_eq!(
            WindowPolicy::new(0, Duration::from_secs(1)),
            Err(PolicyError::ZeroLimit)
        );
        assert_eq!(
            WindowPolicy::new(1, Duration::ZERO),
            Err(PolicyError::ZeroWindow)
        );
        let policy = WindowPolicy::per_hour(3).unwrap();
        assert_eq!(policy.limit(), 3);
        assert_eq!(policy.window(), Duration::from_secs(3600));
    }

    #[test]
    fn test_progressive_durations() {
        let policy = LockoutPolicy::progressive();
        assert_eq!(policy.threshold(), 5);
        assert_eq!(policy.duration_for(0), None);
        assert_eq!(policy.duration_for(4), None);
        assert_eq!(policy.duration_for(5), Some(Duration::from_secs(300)));
        assert_eq!(policy.duration_for(9), Some(Duration::from_secs(300)));
        assert_eq!(policy.duration_for(10), Some(Duration::from_secs(1800)));
        assert_eq!(policy.duration_for(15), Some(Duration::from_secs(3600)));
        assert_eq!(policy.duration_for(100), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_single_tier() {
        let policy = LockoutPolicy::single(3, Duration::from_secs(900)).unwrap();
        assert_eq!(policy.threshold(), 3);
        assert_eq!(policy.duration_for(2), None);
        assert_eq!(policy.duration_for(3), Some(Duration::from_secs(900)));
    }

    #[test]
    fn test_tier_validation() {
        assert_eq!(
            LockoutPolicy::with_tiers(vec![], Duration::from_secs(60)),
            Err(PolicyError::NoTiers)
        );
        assert_eq!(
            LockoutPolicy::with_tiers(
                vec![
                    LockoutTier::new(5, Duration::from_secs(60)),
                    LockoutTier::new(5, Duration::from_secs(120)),
                ],
                Duration::from_secs(60)
            ),
            Err(PolicyError::UnorderedTiers)
        );
        assert_eq!(
            LockoutPolicy::single(0, Duration::from_secs(60)),
            Err(PolicyError::UnorderedTiers)
        );
        assert_eq!(
            LockoutPolicy::single(3, Duration::ZERO),
            Err(PolicyError::ZeroLockoutDuration)
        );
    }

    #[test]
    fn test_policy_error_display() {
        assert_eq!(PolicyError::ZeroLimit.to_string(), "limit must be greater than 0");
    }
}
