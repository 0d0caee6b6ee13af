//! The guarded client and its per-call protection pipeline.
//!
//! Every call runs through the same sequence: token-bucket admission,
//! request size validation, the transport call under the circuit breaker,
//! response size validation, and exponential-backoff retry around the
//! transport stage for transient failures. Guard rejections fail fast and
//! are never retried.

use std::sync::Arc;
use std::time::Duration;

use palisade_resilience::{
    Backoff, BreakerSnapshot, CircuitBreaker, CircuitState, Clock, RateLimitConfig, SystemClock,
    TokenBucket,
};
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::memory::{MemoryEvent, MemoryMonitor, MemorySample};
use crate::size::{validate_request_size, validate_response_size, Payload};
use crate::transport::{HttpTransport, Transport, TransportRequest, TransportResponse};

/// Tokens are replenished over a fixed one-minute window.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Per-request overrides applied on top of the client configuration.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers merged into the request.
    pub headers: HeaderMap,
    /// Override of the transport-level timeout for this call only.
    pub timeout: Option<Duration>,
}

/// Aggregated diagnostics for periodic polling.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityStats {
    pub circuit_breaker: BreakerSnapshot,
    pub memory_usage: MemorySample,
    pub config: ClientConfig,
}

/// HTTP client wrapping an opaque transport with a protection stack.
///
/// Cheap to clone is not a goal here; share it behind an `Arc` instead. The
/// clock parameter exists so the breaker and limiter can run against mock
/// time in tests.
pub struct ResilientClient<C: Clock = SystemClock> {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    breaker: CircuitBreaker<C>,
    limiter: TokenBucket<C>,
    monitor: MemoryMonitor,
    backoff: Backoff,
}

impl ResilientClient<SystemClock> {
    /// Build a client with the reqwest-backed transport.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = Arc::new(HttpTransport::from_config(&config)?);
        Self::with_transport(config, transport)
    }

    /// Build a client around a caller-supplied transport.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        Self::with_transport_and_clock(config, transport, SystemClock)
    }
}

impl<C: Clock + Clone> ResilientClient<C> {
    /// Build a client whose breaker and limiter share the given clock.
    pub fn with_transport_and_clock(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        clock: C,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let breaker = CircuitBreaker::with_clock(config.circuit_breaker.clone(), clock.clone())
            .map_err(|err| ClientError::invalid_config(err.to_string()))?;
        let limiter = TokenBucket::with_clock(
            RateLimitConfig {
                max_tokens: config.max_requests_per_minute,
                window: RATE_LIMIT_WINDOW,
            },
            clock,
        )
        .map_err(|err| ClientError::invalid_config(err.to_string()))?;

        let monitor = MemoryMonitor::new(config.memory_threshold_percent);
        if config.memory_monitoring_enabled {
            monitor.start(config.memory_sample_interval);
        }

        let backoff = Backoff::new(config.retry_base_delay);
        Ok(Self { config, transport, breaker, limiter, monitor, backoff })
    }
}

impl<C: Clock> ResilientClient<C> {
    pub async fn get(&self, url: &str) -> Result<TransportResponse, ClientError> {
        self.request(Method::GET, url, None, RequestOptions::default()).await
    }

    pub async fn delete(&self, url: &str) -> Result<TransportResponse, ClientError> {
        self.request(Method::DELETE, url, None, RequestOptions::default()).await
    }

    pub async fn post(
        &self,
        url: &str,
        body: impl Into<Payload>,
    ) -> Result<TransportResponse, ClientError> {
        self.request(Method::POST, url, Some(body.into()), RequestOptions::default()).await
    }

    pub async fn put(
        &self,
        url: &str,
        body: impl Into<Payload>,
    ) -> Result<TransportResponse, ClientError> {
        self.request(Method::PUT, url, Some(body.into()), RequestOptions::default()).await
    }

    pub async fn patch(
        &self,
        url: &str,
        body: impl Into<Payload>,
    ) -> Result<TransportResponse, ClientError> {
        self.request(Method::PATCH, url, Some(body.into()), RequestOptions::default()).await
    }

    pub async fn get_with_options(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<TransportResponse, ClientError> {
        self.request(Method::GET, url, None, options).await
    }

    pub async fn delete_with_options(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<TransportResponse, ClientError> {
        self.request(Method::DELETE, url, None, options).await
    }

    pub async fn post_with_options(
        &self,
        url: &str,
        body: impl Into<Payload>,
        options: RequestOptions,
    ) -> Result<TransportResponse, ClientError> {
        self.request(Method::POST, url, Some(body.into()), options).await
    }

    pub async fn put_with_options(
        &self,
        url: &str,
        body: impl Into<Payload>,
        options: RequestOptions,
    ) -> Result<TransportResponse, ClientError> {
        self.request(Method::PUT, url, Some(body.into()), options).await
    }

    pub async fn patch_with_options(
        &self,
        url: &str,
        body: impl Into<Payload>,
        options: RequestOptions,
    ) -> Result<TransportResponse, ClientError> {
        self.request(Method::PATCH, url, Some(body.into()), options).await
    }

    /// Issue a request with explicit method, body, and per-call options.
    #[instrument(skip(self, body, options), fields(%method, url))]
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Payload>,
        options: RequestOptions,
    ) -> Result<TransportResponse, ClientError> {
        let mut request = TransportRequest::new(method, url);
        request.headers = options.headers;
        request.body = body;
        request.timeout = options.timeout;
        self.execute_with_guards(request).await
    }

    /// Run the full protection pipeline around one logical request.
    async fn execute_with_guards(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, ClientError> {
        if self.config.rate_limit_enabled {
            self.limiter.acquire()?;
        }

        if let Some(body) = &request.body {
            let size = validate_request_size(body, self.config.max_request_bytes)?;
            debug!(bytes = size, "request body admitted");
        }

        let mut attempt: u32 = 1;
        loop {
            match self.dispatch(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !(self.config.retry_enabled && err.is_retryable()) {
                        return Err(err);
                    }
                    if attempt > self.config.max_retries {
                        return Err(ClientError::MaxRetriesExceeded {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    let delay = self.backoff.delay_for(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err,
                        "transient failure, backing off before retry");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One attempt: transport call under the breaker, then response sizing.
    ///
    /// Non-success statuses surface as errors inside the breaker closure so
    /// the breaker counts them as failures. Response size rejection happens
    /// after the breaker: an oversized body from a healthy upstream is a
    /// policy rejection, not a dependency failure.
    async fn dispatch(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, ClientError> {
        let transport = Arc::clone(&self.transport);
        let call = move || async move {
            let response = transport.send(request).await?;
            if response.status.is_client_error() || response.status.is_server_error() {
                return Err(ClientError::Status { status: response.status });
            }
            Ok(response)
        };

        let response = if self.config.circuit_breaker_enabled {
            self.breaker.execute(call).await.map_err(ClientError::from)?
        } else {
            call().await?
        };

        validate_response_size(&response.headers, &response.body, self.config.max_response_bytes)?;
        Ok(response)
    }

    /// Current circuit state.
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Force the circuit breaker back to closed.
    pub fn reset_circuit_breaker(&self) {
        self.breaker.reset();
    }

    /// Tokens currently available in the rate-limit bucket.
    pub fn available_tokens(&self) -> f64 {
        self.limiter.available_tokens()
    }

    /// Aggregated diagnostics: breaker snapshot, memory sample, and the
    /// active configuration.
    pub fn security_stats(&self) -> SecurityStats {
        SecurityStats {
            circuit_breaker: self.breaker.snapshot(),
            memory_usage: self.monitor.current_usage(),
            config: self.config.clone(),
        }
    }

    /// Subscribe to memory threshold/leak events.
    pub fn memory_events(&self) -> broadcast::Receiver<MemoryEvent> {
        self.monitor.subscribe()
    }

    /// The active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Stop background work. Dropping the client has the same effect.
    pub fn shutdown(&self) {
        self.monitor.stop();
    }
}
