use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;

/// How the forwarding layer should treat the upstream response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Attempt a JSON decode, falling back to a text string.
    Parsed,
    /// Keep the body as raw bytes for byte-exact passthrough.
    Raw,
}

/// Body of an upstream response as captured by a provider client.
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Json(Value),
    Raw(Bytes),
    Empty,
}

impl ResponseBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// An upstream response (or a synthesized failure standing in for one).
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: ResponseBody,
    pub first_byte_delay_ms: Option<u64>,
    pub total_time_ms: Option<u64>,
    /// Set on synthesized transport failures (timeout, connect error).
    pub error: Option<String>,
}

impl ProviderResponse {
    /// Synthesize a failure response carrying no upstream body.
    pub fn failure(status: u16, error: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: ResponseBody::Empty,
            first_byte_delay_ms: None,
            total_time_ms: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}
