//! Circuit breaker for preventing cascading failures.
//!
//! The breaker wraps an arbitrary async operation and stops invoking it once
//! a run of consecutive failures crosses the configured threshold. After a
//! recovery timeout it lets trial calls through (half-open) and closes again
//! once enough of them succeed.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::util::duration_millis;

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors produced by a guarded execution.
///
/// Generic over the operation error type `E` so the original cause is
/// preserved when the operation itself fails.
#[derive(Debug, Error)]
pub enum BreakerError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The circuit is open; the operation was not invoked.
    #[error("Circuit breaker is open, rejecting calls")]
    Open,

    /// The operation ran and failed.
    #[error("Guarded operation failed")]
    Operation {
        #[source]
        source: E,
    },
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls fail fast without reaching the dependency.
    Open,
    /// Trial state probing recovery after the cooldown.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive in-window failures before the circuit opens.
    pub failure_threshold: u32,
    /// Half-open successes required to close the circuit.
    pub success_threshold: u32,
    /// Cooldown before an open circuit lets a trial call through.
    #[serde(with = "duration_millis")]
    pub recovery_timeout: Duration,
    /// Maximum age of a failure run; older runs restart the count.
    #[serde(with = "duration_millis")]
    pub monitoring_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            monitoring_window: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "success_threshold must be greater than 0".to_string(),
            });
        }
        if self.recovery_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                message: "recovery_timeout must be greater than zero".to_string(),
            });
        }
        if self.monitoring_window.is_zero() {
            return Err(ConfigError::Invalid {
                message: "monitoring_window must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout = timeout;
        self
    }

    pub fn monitoring_window(mut self, window: Duration) -> Self {
        self.config.monitoring_window = window;
        self
    }

    pub fn build(self) -> Result<CircuitBreakerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Serializable snapshot of breaker state for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Wall-clock timestamp of the last recorded failure, epoch milliseconds.
    pub last_failure_at_ms: Option<u64>,
    pub half_open_successes: u32,
}

/// Mutable breaker state, updated as one unit under the lock.
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    /// Monotonic timestamp of the first failure in the current run.
    window_started_at: Option<Instant>,
    last_failure_at: Option<Instant>,
    last_failure_epoch_ms: Option<u64>,
    half_open_successes: u32,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            window_started_at: None,
            last_failure_at: None,
            last_failure_epoch_ms: None,
            half_open_successes: 0,
        }
    }
}

/// Failure-aware state machine wrapping an arbitrary async operation.
///
/// State transitions:
/// - CLOSED → OPEN: `failure_threshold` consecutive failures inside the
///   monitoring window
/// - OPEN → HALF_OPEN: `recovery_timeout` elapsed since the last failure
/// - HALF_OPEN → CLOSED: `success_threshold` consecutive trial successes
/// - HALF_OPEN → OPEN: any single trial failure
///
/// The failure run is counted relative to the window start (the first failure
/// of the run): a failure arriving after the window has fully elapsed starts
/// a new run with count 1 instead of accumulating indefinitely.
///
/// Cloning is cheap and shares the underlying state.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerState>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker with the given configuration using the system clock.
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for CircuitBreaker<SystemClock> {
    fn default() -> Self {
        // Default config is statically valid.
        Self {
            config: CircuitBreakerConfig::default(),
            inner: Arc::new(Mutex::new(BreakerState::new())),
            clock: Arc::new(SystemClock),
        }
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock.
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            inner: Arc::new(Mutex::new(BreakerState::new())),
            clock: Arc::new(clock),
        })
    }

    /// Check whether a call may proceed, transitioning OPEN → HALF_OPEN when
    /// the recovery timeout has elapsed.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let recovered = inner.last_failure_at.is_some_and(|at| {
                    self.clock.now().duration_since(at) >= self.config.recovery_timeout
                });
                if recovered {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    debug!("circuit breaker entering half-open trial state");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Execute an operation under breaker protection.
    ///
    /// Fails with [`BreakerError::Open`] without invoking the operation when
    /// the circuit is open and the cooldown has not elapsed.
    #[instrument(skip(self, operation), fields(state = %self.state()))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if !self.can_execute() {
            debug!("circuit breaker rejecting call");
            return Err(BreakerError::Open);
        }

        match operation().await {
            Ok(result) => {
                self.record_success();
                debug!("guarded operation succeeded");
                Ok(result)
            }
            Err(error) => {
                self.record_failure();
                warn!(error = %error, "guarded operation failed");
                Err(BreakerError::Operation { source: error })
            }
        }
    }

    /// Record a successful operation.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.window_started_at = None;

        if inner.state == CircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.success_threshold {
                inner.state = CircuitState::Closed;
                info!(
                    successes = inner.half_open_successes,
                    "circuit breaker closed after successful trial calls"
                );
            }
        }
    }

    /// Record a failed operation.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let now = self.clock.now();

        // Window-start-relative counting: a failure landing after the window
        // has fully elapsed begins a new run.
        match inner.window_started_at {
            Some(started) if now.duration_since(started) > self.config.monitoring_window => {
                inner.consecutive_failures = 0;
                inner.window_started_at = Some(now);
            }
            Some(_) => {}
            None => inner.window_started_at = Some(now),
        }

        inner.consecutive_failures += 1;
        inner.last_failure_at = Some(now);
        inner.last_failure_epoch_ms = Some(self.clock.millis_since_epoch());

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker opened after consecutive failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // A single trial failure reopens the circuit.
                inner.state = CircuitState::Open;
                inner.half_open_successes = 0;
                warn!("circuit breaker reopened after failure in half-open state");
            }
            CircuitState::Open => {}
        }
    }

    /// Current circuit state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of the breaker state for diagnostics.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_at_ms: inner.last_failure_epoch_ms,
            half_open_successes: inner.half_open_successes,
        }
    }

    /// Reset the breaker to the closed state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        *inner = BreakerState::new();
        info!("circuit breaker manually reset to closed state");
    }
}
