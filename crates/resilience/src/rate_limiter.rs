//! Token-bucket rate limiter with continuous, time-proportional refill.
//!
//! Unlike interval-based buckets, this limiter refills fractional tokens on
//! every acquisition attempt in proportion to the elapsed time, so admission
//! is deterministic given a monotonic clock. `acquire` never suspends: a call
//! is either granted or rejected immediately.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::circuit_breaker::ConfigError;
use crate::clock::{Clock, SystemClock};
use crate::util::duration_millis;

/// Rejection raised when no token is available.
#[derive(Debug, Clone, Error)]
#[error("Rate limit exceeded: {max_tokens} requests per {window:?}")]
pub struct RateLimitExceeded {
    pub max_tokens: u32,
    pub window: Duration,
}

/// Configuration for the token bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket capacity; also the number of tokens refilled per full window.
    pub max_tokens: u32,
    /// Time for a full refill from empty.
    #[serde(with = "duration_millis")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max_tokens: 60, window: Duration::from_secs(60) }
    }
}

impl RateLimitConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid {
                message: "max_tokens must be greater than 0".to_string(),
            });
        }
        if self.window.is_zero() {
            return Err(ConfigError::Invalid {
                message: "window must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Bucket state updated as one unit under the lock.
#[derive(Debug)]
struct BucketState {
    /// Fractional token count, bounded to `[0, max_tokens]`.
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket admission control.
///
/// The bucket starts full. Each admitted call consumes one token; tokens
/// refill continuously at `max_tokens / window`. Cloning is cheap and shares
/// the underlying bucket.
pub struct TokenBucket<C: Clock = SystemClock> {
    config: RateLimitConfig,
    inner: Arc<Mutex<BucketState>>,
    clock: Arc<C>,
}

impl TokenBucket<SystemClock> {
    /// Create a bucket with the system clock.
    pub fn new(config: RateLimitConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Create a bucket with a custom clock.
    pub fn with_clock(config: RateLimitConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        let inner = BucketState { tokens: f64::from(config.max_tokens), last_refill: clock.now() };
        Ok(Self { config, inner: Arc::new(Mutex::new(inner)), clock: Arc::new(clock) })
    }

    /// Refill proportionally to elapsed time and advance the refill marker.
    fn refill(&self, inner: &mut BucketState) {
        let now = self.clock.now();
        let elapsed = now.duration_since(inner.last_refill);
        let replenished = elapsed.as_secs_f64() / self.config.window.as_secs_f64()
            * f64::from(self.config.max_tokens);
        inner.tokens = (inner.tokens + replenished).min(f64::from(self.config.max_tokens));
        inner.last_refill = now;
    }

    /// Acquire one token, rejecting immediately when none is available.
    pub fn acquire(&self) -> Result<(), RateLimitExceeded> {
        let mut inner = self.inner.lock();
        self.refill(&mut inner);

        if inner.tokens < 1.0 {
            debug!(tokens = inner.tokens, "rate limit rejection");
            return Err(RateLimitExceeded {
                max_tokens: self.config.max_tokens,
                window: self.config.window,
            });
        }

        inner.tokens -= 1.0;
        debug!(remaining = inner.tokens, "token acquired");
        Ok(())
    }

    /// Acquire one token, returning whether it was granted.
    pub fn try_acquire(&self) -> bool {
        self.acquire().is_ok()
    }

    /// Current token count after refill.
    pub fn available_tokens(&self) -> f64 {
        let mut inner = self.inner.lock();
        self.refill(&mut inner);
        inner.tokens
    }

    /// Reset the bucket to full capacity.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.tokens = f64::from(self.config.max_tokens);
        inner.last_refill = self.clock.now();
    }
}

impl<C: Clock> Clone for TokenBucket<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn bucket(max_tokens: u32, window: Duration) -> (TokenBucket<MockClock>, MockClock) {
        let clock = MockClock::new();
        let config = RateLimitConfig { max_tokens, window };
        (TokenBucket::with_clock(config, clock.clone()).unwrap(), clock)
    }

    #[test]
    fn grants_up_to_capacity_then_rejects() {
        let (limiter, _clock) = bucket(2, Duration::from_secs(60));

        assert!(limiter.acquire().is_ok());
        assert!(limiter.acquire().is_ok());

        let err = limiter.acquire().unwrap_err();
        assert_eq!(err.max_tokens, 2);
        assert_eq!(err.window, Duration::from_secs(60));
    }

    #[test]
    fn full_window_replenishes_completely() {
        let (limiter, clock) = bucket(2, Duration::from_secs(60));

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        clock.advance(Duration::from_secs(60));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn refill_is_proportional_to_elapsed_time() {
        let (limiter, clock) = bucket(60, Duration::from_secs(60));

        for _ in 0..60 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        // One second refills one token for a 60/minute bucket.
        clock.advance(Duration::from_secs(1));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn tokens_never_exceed_capacity() {
        let (limiter, clock) = bucket(5, Duration::from_secs(1));

        clock.advance(Duration::from_secs(100));
        assert!((limiter.available_tokens() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reset_restores_full_capacity() {
        let (limiter, _clock) = bucket(3, Duration::from_secs(60));

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        limiter.reset();
        assert!((limiter.available_tokens() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clones_share_the_bucket() {
        let (limiter, _clock) = bucket(1, Duration::from_secs(60));
        let other = limiter.clone();

        assert!(limiter.try_acquire());
        assert!(!other.try_acquire());
    }

    #[test]
    fn config_validation() {
        assert!(RateLimitConfig { max_tokens: 0, window: Duration::from_secs(1) }
            .validate()
            .is_err());
        assert!(RateLimitConfig { max_tokens: 1, window: Duration::ZERO }.validate().is_err());
        assert!(RateLimitConfig::default().validate().is_ok());
    }
}
