//! Request/response size guards.
//!
//! Pure sizing functions: the same payload always yields the same byte
//! count. Structured payloads are measured by their JSON encoding, matching
//! what the transport puts on the wire.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::error::ClientError;

/// An outbound request body.
#[derive(Debug, Clone)]
pub enum Payload {
    /// UTF-8 text, sized by its byte length.
    Text(String),
    /// Raw bytes, sized by buffer length.
    Binary(Bytes),
    /// Structured value, sized by its serialized JSON byte length.
    Json(Value),
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(value))
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Self::Binary(value)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Compute the wire size of a payload in bytes.
pub fn payload_size(payload: &Payload) -> Result<u64, ClientError> {
    let size = match payload {
        Payload::Text(text) => text.len(),
        Payload::Binary(bytes) => bytes.len(),
        Payload::Json(value) => serde_json::to_vec(value)?.len(),
    };
    Ok(size as u64)
}

/// Reject a request body larger than `max_bytes`; a body of exactly
/// `max_bytes` is accepted. Returns the computed size.
pub fn validate_request_size(payload: &Payload, max_bytes: u64) -> Result<u64, ClientError> {
    let size = payload_size(payload)?;
    if size > max_bytes {
        return Err(ClientError::RequestTooLarge { size, limit: max_bytes });
    }
    Ok(size)
}

/// Total response size: the byte length of every `name: value` header line
/// plus the body length.
pub fn response_size(headers: &HeaderMap, body: &[u8]) -> u64 {
    let header_bytes: usize = headers
        .iter()
        .map(|(name, value)| name.as_str().len() + 2 + value.as_bytes().len())
        .sum();
    (header_bytes + body.len()) as u64
}

/// Reject a response whose headers + body exceed `max_bytes`. Returns the
/// computed size.
pub fn validate_response_size(
    headers: &HeaderMap,
    body: &[u8],
    max_bytes: u64,
) -> Result<u64, ClientError> {
    let size = response_size(headers, body);
    if size > max_bytes {
        return Err(ClientError::ResponseTooLarge { size, limit: max_bytes });
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderValue, CONTENT_TYPE};
    use serde_json::json;

    use super::*;

    #[test]
    fn text_is_sized_by_utf8_bytes() {
        // "héllo" is 6 bytes in UTF-8, 5 characters.
        let size = payload_size(&Payload::from("héllo")).unwrap();
        assert_eq!(size, 6);
    }

    #[test]
    fn binary_is_sized_by_buffer_length() {
        let size = payload_size(&Payload::from(vec![0u8; 1024])).unwrap();
        assert_eq!(size, 1024);
    }

    #[test]
    fn json_is_sized_by_serialized_length() {
        let value = json!({"key": "value"});
        let expected = serde_json::to_vec(&value).unwrap().len() as u64;
        assert_eq!(payload_size(&Payload::Json(value)).unwrap(), expected);
    }

    #[test]
    fn payload_size_is_pure() {
        let a = Payload::Json(json!({"n": 42, "items": [1, 2, 3]}));
        let b = Payload::Json(json!({"n": 42, "items": [1, 2, 3]}));
        assert_eq!(payload_size(&a).unwrap(), payload_size(&b).unwrap());
        assert_eq!(payload_size(&a).unwrap(), payload_size(&a).unwrap());
    }

    #[test]
    fn request_at_exact_limit_is_accepted() {
        let payload = Payload::from(vec![0u8; 100]);
        assert_eq!(validate_request_size(&payload, 100).unwrap(), 100);
    }

    #[test]
    fn request_over_limit_is_rejected_with_sizes() {
        let payload = Payload::from(vec![0u8; 101]);
        let err = validate_request_size(&payload, 100).unwrap_err();
        assert!(
            matches!(err, ClientError::RequestTooLarge { size: 101, limit: 100 }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn response_size_counts_headers_and_body() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        // "content-type" (12) + ": " (2) + "text/plain" (10) = 24
        assert_eq!(response_size(&headers, b"hello"), 24 + 5);
    }

    #[test]
    fn oversized_response_is_rejected() {
        let headers = HeaderMap::new();
        let body = vec![0u8; 64];
        let err = validate_response_size(&headers, &body, 32).unwrap_err();
        assert!(matches!(err, ClientError::ResponseTooLarge { size: 64, limit: 32 }));
    }
}
