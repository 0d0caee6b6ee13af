//! Generic resilience primitives for guarding outbound calls.
//!
//! This crate provides the reusable building blocks of the Palisade guard
//! stack:
//! - **Circuit Breaker**: failure-aware state machine that stops calling a
//!   failing dependency for a cooldown period
//! - **Token Bucket**: admission control with continuous, time-proportional
//!   token refill
//! - **Backoff**: deterministic exponential delay schedule for retries
//!
//! All timing-sensitive types are generic over a [`Clock`] so state
//! transitions can be tested deterministically with [`MockClock`] instead of
//! real delays. The primitives are domain-free: they know nothing about HTTP
//! and wrap arbitrary operations.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod rate_limiter;
pub mod util;

pub use backoff::Backoff;
pub use circuit_breaker::{
    BreakerError, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerConfigBuilder, CircuitState, ConfigError,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use rate_limiter::{RateLimitConfig, RateLimitExceeded, TokenBucket};
pub use util::duration_millis;
