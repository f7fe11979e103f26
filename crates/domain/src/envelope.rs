//! Canonical API response envelope.
//!
//! The backend answers either with `{ data, error?, message?, status }` or a
//! bare payload depending on the endpoint. The executor normalizes both into
//! one [`ApiEnvelope`] so callers never chase nested `data.data.x` shapes;
//! any endpoint-specific unwrapping is the caller's business.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::ClientError;

/// Normalized response envelope returned by the request executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiEnvelope {
    /// The payload: the `data` field of a wrapped response, or the bare body.
    pub data: Value,
    /// Server-supplied human-readable message, when wrapped.
    pub message: Option<String>,
    /// Server-supplied application status code, when wrapped.
    pub status: Option<i64>,
}

impl ApiEnvelope {
    /// Normalize a raw JSON body into the canonical envelope.
    ///
    /// An object carrying a `data` key is treated as wrapped; anything else
    /// is a bare payload.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) if map.contains_key("data") => {
                let data = map.remove("data").unwrap_or(Value::Null);
                let message =
                    map.remove("message").and_then(|m| m.as_str().map(ToOwned::to_owned));
                let status = map.remove("status").and_then(|s| s.as_i64());
                Self { data, message, status }
            }
            other => Self { data: other, message: None, status: None },
        }
    }

    /// Envelope for bodyless responses (204).
    pub fn empty() -> Self {
        Self { data: Value::Null, message: None, status: None }
    }

    /// Deserialize the payload into a concrete type.
    ///
    /// # Errors
    /// Returns [`ClientError::MalformedResponse`] if the payload does not
    /// match the expected shape.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        serde_json::from_value(self.data)
            .map_err(|err| ClientError::MalformedResponse(err.to_string()))
    }
}
