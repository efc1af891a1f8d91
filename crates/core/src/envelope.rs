//! Success/error response envelopes returned by every REST endpoint.

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::warn;

/// The `detail` of an error envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Message(String),
    /// Validation failures are reported as a list of objects.
    Items(Vec<serde_json::Map<String, Value>>),
}

impl ErrorDetail {
    /// The textual detail, when the server sent one.
    pub fn message(&self) -> Option<&str> {
        match self {
            ErrorDetail::Message(message) => Some(message),
            ErrorDetail::Items(_) => None,
        }
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.message().is_some_and(|m| m.contains(pattern))
    }
}

/// A validated response: either `{data: …}` or `{detail: …}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<T> {
    Data(T),
    Detail(ErrorDetail),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEnvelope<T> {
    Data { data: T },
    Detail { detail: ErrorDetail },
}

impl<T: DeserializeOwned> ApiResponse<T> {
    /// Validates a raw body against both envelope shapes.
    ///
    /// Returns `None` when the body is missing or matches neither shape.
    pub fn parse(body: Option<Value>) -> Option<Self> {
        let body = body?;
        match serde_json::from_value::<RawEnvelope<T>>(body) {
            Ok(RawEnvelope::Data { data }) => Some(ApiResponse::Data(data)),
            Ok(RawEnvelope::Detail { detail }) => Some(ApiResponse::Detail(detail)),
            Err(e) => {
                warn!(error = %e, "Response matched neither data nor detail envelope");
                None
            }
        }
    }
}
