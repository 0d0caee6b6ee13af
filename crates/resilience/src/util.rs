//! Serialization utilities shared by guard configuration types.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serde adapter storing a `Duration` as integer milliseconds.
///
/// ```rust
/// use std::time::Duration;
///
/// use palisade_resilience::duration_millis;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Example {
///     #[serde(with = "duration_millis")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::*;

    /// Serialize a `Duration` as milliseconds (u64).
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    /// Deserialize milliseconds (u64) into a `Duration`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::duration_millis;
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Wrapper {
        #[serde(with = "duration_millis")]
        delay: Duration,
    }

    #[test]
    fn serializes_as_millis() {
        let json = serde_json::to_string(&Wrapper { delay: Duration::from_secs(2) }).unwrap();
        assert_eq!(json, r#"{"delay":2000}"#);
    }

    #[test]
    fn deserializes_from_millis() {
        let wrapper: Wrapper = serde_json::from_str(r#"{"delay":1500}"#).unwrap();
        assert_eq!(wrapper.delay, Duration::from_millis(1500));
    }
}
