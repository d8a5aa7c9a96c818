//! Clock adapters.
//!
//! Windows, lockouts and the circuit breaker all read time through the
//! [`Clock`] port. `MockClock` (in `crate::infrastructure::mocks`, behind the
//! `test-helpers` feature) lets tests move time forward by hand.

use crate::application::ports::Clock;
use std::time::Instant;

/// System clock implementation using `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
