//! Transport abstraction over the network stack.
//!
//! The guard pipeline talks to an opaque [`Transport`] so the protection
//! logic is testable without a network. [`HttpTransport`] is the
//! reqwest-backed production implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::size::Payload;

/// A fully-described outbound request, independent of any HTTP library.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Payload>,
    /// Per-request override of the transport's default timeout.
    pub timeout: Option<Duration>,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), headers: HeaderMap::new(), body: None, timeout: None }
    }
}

/// The raw upstream response before size validation.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Interpret the body as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends a single request and returns the buffered response.
///
/// Implementations perform exactly one attempt; retries, admission control
/// and size limits live above this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ClientError>;
}

/// Production transport backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpTransport {
    /// Build a transport from the client configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, base_url: config.base_url.clone() })
    }

    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        match &self.base_url {
            Some(base) => {
                format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
            }
            None => url.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ClientError> {
        let url = self.resolve_url(&request.url);
        debug!(method = %request.method, %url, "sending request");

        let mut builder =
            self.client.request(request.method, &url).headers(request.headers);

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        builder = match request.body {
            Some(Payload::Text(text)) => builder.body(text),
            Some(Payload::Binary(bytes)) => builder.body(bytes),
            Some(Payload::Json(value)) => builder.json(&value),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        debug!(%status, body_bytes = body.len(), "received response");
        Ok(TransportResponse { status, headers, body })
    }
}
