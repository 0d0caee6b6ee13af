//! Resilient outbound HTTP client.
//!
//! [`ResilientClient`] layers a protection stack in front of an opaque HTTP
//! transport to bound denial-of-service exposure and contain cascading
//! failure when calling remote services. Per call it sequences:
//!
//! 1. token-bucket rate limiting (admission, fail fast)
//! 2. request size validation
//! 3. the transport call inside a circuit breaker
//! 4. response size validation
//! 5. exponential-backoff retry for transient failures
//!
//! A background [`memory::MemoryMonitor`] samples process memory and emits
//! threshold/leak events on a typed channel. Aggregated diagnostics are
//! available through [`client::SecurityStats`] for periodic polling.
//!
//! The actual network stack is behind the [`transport::Transport`] trait;
//! [`transport::HttpTransport`] is the reqwest-backed default, and tests plug
//! in scripted implementations.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod size;
pub mod transport;

pub use client::{RequestOptions, ResilientClient, SecurityStats};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::ClientError;
pub use memory::{MemoryEvent, MemoryMonitor, MemorySample};
pub use size::Payload;
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse};

// Re-export the resilience primitives callers interact with directly.
pub use palisade_resilience::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState, Clock, MockClock,
    SystemClock,
};
