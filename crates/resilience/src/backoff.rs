//! Deterministic exponential backoff schedule for retries.

use std::time::Duration;

/// Exponential backoff: `base_delay * 2^(attempt - 1)`.
///
/// Attempts are 1-based: the delay after the first failed attempt is
/// `base_delay`, doubling on each subsequent attempt. The shift is capped so
/// large attempt numbers saturate instead of overflowing.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base_delay: Duration,
}

impl Backoff {
    /// Create a backoff schedule with the given base delay.
    pub fn new(base_delay: Duration) -> Self {
        Self { base_delay }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let multiplier = 1u32 << shift;
        self.base_delay.saturating_mul(multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        let backoff = Backoff::new(Duration::from_millis(100));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn attempt_zero_is_treated_as_first() {
        let backoff = Backoff::new(Duration::from_millis(50));
        assert_eq!(backoff.delay_for(0), Duration::from_millis(50));
    }

    #[test]
    fn large_attempts_saturate_instead_of_overflowing() {
        let backoff = Backoff::new(Duration::from_secs(1));
        assert_eq!(backoff.delay_for(u32::MAX), backoff.delay_for(17));
    }
}
