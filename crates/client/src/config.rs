//! Typed client configuration with documented defaults.
//!
//! The config is merged immutably at construction: the builder produces a
//! validated [`ClientConfig`] and the client never mutates it afterwards.
//! Duration fields serialize as integer milliseconds so the diagnostics
//! snapshot stays JSON-friendly.

use std::time::Duration;

use palisade_resilience::{duration_millis, CircuitBreakerConfig};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Default request body limit: 10 MiB.
pub const DEFAULT_MAX_REQUEST_BYTES: u64 = 10 * 1024 * 1024;
/// Default response limit (headers + body): 50 MiB.
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 50 * 1024 * 1024;

/// Aggregate configuration for [`crate::ResilientClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Optional base URL joined with relative request paths.
    pub base_url: Option<String>,

    /// Maximum request body size in bytes.
    pub max_request_bytes: u64,
    /// Maximum response size (headers + body) in bytes.
    pub max_response_bytes: u64,

    /// Total per-request timeout.
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Connection-establishment timeout.
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,

    /// Whether transport calls go through the circuit breaker.
    pub circuit_breaker_enabled: bool,
    /// Circuit breaker thresholds and windows.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Whether the token-bucket admission check runs per call.
    pub rate_limit_enabled: bool,
    /// Bucket capacity over a one-minute window.
    pub max_requests_per_minute: u32,

    /// Whether transient failures are retried.
    pub retry_enabled: bool,
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay for the exponential backoff schedule.
    #[serde(with = "duration_millis")]
    pub retry_base_delay: Duration,

    /// Whether the background memory sampler starts with the client.
    pub memory_monitoring_enabled: bool,
    /// Heap usage percentage above which a threshold event is emitted.
    pub memory_threshold_percent: f64,
    /// Interval between memory samples.
    #[serde(with = "duration_millis")]
    pub memory_sample_interval: Duration,

    /// User-Agent header sent by the default transport.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            circuit_breaker_enabled: true,
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit_enabled: false,
            max_requests_per_minute: 60,
            retry_enabled: true,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            memory_monitoring_enabled: true,
            memory_threshold_percent: 80.0,
            memory_sample_interval: Duration::from_secs(30),
            user_agent: concat!("palisade-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.max_request_bytes == 0 {
            return Err(ClientError::invalid_config("max_request_bytes must be greater than 0"));
        }
        if self.max_response_bytes == 0 {
            return Err(ClientError::invalid_config("max_response_bytes must be greater than 0"));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::invalid_config("timeout must be greater than zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ClientError::invalid_config("connect_timeout must be greater than zero"));
        }
        if self.rate_limit_enabled && self.max_requests_per_minute == 0 {
            return Err(ClientError::invalid_config(
                "max_requests_per_minute must be greater than 0 when rate limiting is enabled",
            ));
        }
        if !(0.0..=100.0).contains(&self.memory_threshold_percent)
            || self.memory_threshold_percent == 0.0
        {
            return Err(ClientError::invalid_config(
                "memory_threshold_percent must be in (0, 100]",
            ));
        }
        if self.memory_sample_interval.is_zero() {
            return Err(ClientError::invalid_config(
                "memory_sample_interval must be greater than zero",
            ));
        }
        self.circuit_breaker
            .validate()
            .map_err(|err| ClientError::invalid_config(err.to_string()))?;
        Ok(())
    }
}

/// Builder for [`ClientConfig`] with fluent setters.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self { config: ClientConfig::default() }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn max_request_bytes(mut self, bytes: u64) -> Self {
        self.config.max_request_bytes = bytes;
        self
    }

    pub fn max_response_bytes(mut self, bytes: u64) -> Self {
        self.config.max_response_bytes = bytes;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn circuit_breaker_enabled(mut self, enabled: bool) -> Self {
        self.config.circuit_breaker_enabled = enabled;
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = config;
        self
    }

    pub fn rate_limit_enabled(mut self, enabled: bool) -> Self {
        self.config.rate_limit_enabled = enabled;
        self
    }

    pub fn max_requests_per_minute(mut self, max: u32) -> Self {
        self.config.max_requests_per_minute = max;
        self
    }

    pub fn retry_enabled(mut self, enabled: bool) -> Self {
        self.config.retry_enabled = enabled;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry_base_delay = delay;
        self
    }

    pub fn memory_monitoring_enabled(mut self, enabled: bool) -> Self {
        self.config.memory_monitoring_enabled = enabled;
        self
    }

    pub fn memory_threshold_percent(mut self, percent: f64) -> Self {
        self.config.memory_threshold_percent = percent;
        self
    }

    pub fn memory_sample_interval(mut self, interval: Duration) -> Self {
        self.config.memory_sample_interval = interval;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn build(self) -> Result<ClientConfig, ClientError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
