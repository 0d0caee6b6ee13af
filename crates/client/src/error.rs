//! Error taxonomy for the guarded client.
//!
//! Admission-guard rejections (rate limit, circuit open, size limits) are
//! policy decisions and are never retried; transport-level failures are
//! classified for retry and, once retries are exhausted, wrapped so the last
//! underlying cause stays on the chain.

use std::time::Duration;

use palisade_resilience::{BreakerError, RateLimitExceeded};
use reqwest::StatusCode;
use thiserror::Error;

/// HTTP statuses treated as transient upstream conditions.
const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Errors surfaced by [`crate::ResilientClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request body exceeds the configured limit. Never retried.
    #[error("Request body too large: {size} bytes (max: {limit})")]
    RequestTooLarge { size: u64, limit: u64 },

    /// Response (headers + body) exceeds the configured limit. Never retried.
    #[error("Response too large: {size} bytes (max: {limit})")]
    ResponseTooLarge { size: u64, limit: u64 },

    /// No rate-limit token available. Never retried.
    #[error("Rate limit exceeded: {max_requests} requests per {window:?}")]
    RateLimitExceeded { max_requests: u32, window: Duration },

    /// The circuit breaker rejected the call without invoking the transport.
    #[error("Circuit breaker is open, rejecting calls")]
    CircuitOpen,

    /// Retries were exhausted; the last underlying failure is the source.
    #[error("Max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },

    /// The underlying transport failed (connection, timeout, protocol).
    #[error("Transport error")]
    Transport {
        #[from]
        source: reqwest::Error,
    },

    /// The remote returned a non-success HTTP status.
    #[error("Upstream returned error status {status}")]
    Status { status: StatusCode },

    /// A structured payload could not be serialized for sizing or sending.
    #[error("Payload serialization failed")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// Configuration rejected at construction time.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl ClientError {
    /// Whether this failure is transient and worth retrying.
    ///
    /// Only transport-level failures qualify: network/connection errors,
    /// timeouts, and the conventional retryable status set. Admission-guard
    /// rejections are policy, not transience.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { source } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            Self::Status { status } => RETRYABLE_STATUSES.contains(&status.as_u16()),
            _ => false,
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }
}

impl From<BreakerError<ClientError>> for ClientError {
    fn from(err: BreakerError<ClientError>) -> Self {
        match err {
            BreakerError::Open => Self::CircuitOpen,
            BreakerError::Operation { source } => source,
        }
    }
}

impl From<RateLimitExceeded> for ClientError {
    fn from(err: RateLimitExceeded) -> Self {
        Self::RateLimitExceeded { max_requests: err.max_tokens, window: err.window }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_match_convention() {
        for code in [408u16, 429, 500, 502, 503, 504] {
            let err = ClientError::Status { status: StatusCode::from_u16(code).unwrap() };
            assert!(err.is_retryable(), "{code} should be retryable");
        }
        for code in [400u16, 401, 403, 404, 422] {
            let err = ClientError::Status { status: StatusCode::from_u16(code).unwrap() };
            assert!(!err.is_retryable(), "{code} should not be retryable");
        }
    }

    #[test]
    fn admission_guard_errors_are_never_retryable() {
        let errors = [
            ClientError::RequestTooLarge { size: 11, limit: 10 },
            ClientError::ResponseTooLarge { size: 11, limit: 10 },
            ClientError::RateLimitExceeded {
                max_requests: 60,
                window: Duration::from_secs(60),
            },
            ClientError::CircuitOpen,
        ];
        for err in errors {
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn breaker_open_maps_to_circuit_open() {
        let err: ClientError = BreakerError::<ClientError>::Open.into();
        assert!(matches!(err, ClientError::CircuitOpen));
    }

    #[test]
    fn breaker_operation_failure_unwraps_original_cause() {
        let status = ClientError::Status { status: StatusCode::NOT_FOUND };
        let err: ClientError = BreakerError::Operation { source: status }.into();
        assert!(matches!(err, ClientError::Status { status } if status == StatusCode::NOT_FOUND));
    }

    #[test]
    fn max_retries_preserves_cause_chain() {
        let last = ClientError::Status { status: StatusCode::SERVICE_UNAVAILABLE };
        let err = ClientError::MaxRetriesExceeded { attempts: 4, source: Box::new(last) };

        let source = std::error::Error::source(&err).expect("cause preserved");
        assert!(source.to_string().contains("503"));
    }
}
