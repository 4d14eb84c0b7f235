use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One append-only row per ingress request, written after the response has
/// completed or definitively failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    pub id: i64,
    pub trace_id: String,
    pub request_time: DateTime<Utc>,
    pub api_key_id: Option<i64>,
    pub api_key_name: Option<String>,
    pub requested_model: Option<String>,
    pub target_model: Option<String>,
    pub provider_id: Option<i64>,
    pub provider_name: Option<String>,
    pub retry_count: u32,
    pub matched_provider_count: Option<u32>,
    pub first_byte_delay_ms: Option<u64>,
    pub total_time_ms: Option<u64>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    /// Sanitized request headers.
    pub request_headers: Option<Value>,
    /// Possibly truncated request body.
    pub request_body: Option<Value>,
    pub response_status: Option<u16>,
    pub response_body: Option<Value>,
    /// Hop-filtered upstream response headers.
    pub response_headers: Option<Value>,
    pub error_info: Option<String>,
    pub is_stream: bool,
    pub request_protocol: Option<String>,
    pub supplier_protocol: Option<String>,
}

/// Fields for creating a request log row.
#[derive(Debug, Clone, Default)]
pub struct NewRequestLog {
    pub trace_id: String,
    pub request_time: Option<DateTime<Utc>>,
    pub api_key_id: Option<i64>,
    pub api_key_name: Option<String>,
    pub requested_model: Option<String>,
    pub target_model: Option<String>,
    pub provider_id: Option<i64>,
    pub provider_name: Option<String>,
    pub retry_count: u32,
    pub matched_provider_count: Option<u32>,
    pub first_byte_delay_ms: Option<u64>,
    pub total_time_ms: Option<u64>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub request_headers: Option<Value>,
    pub request_body: Option<Value>,
    pub response_status: Option<u16>,
    pub response_body: Option<Value>,
    pub response_headers: Option<Value>,
    pub error_info: Option<String>,
    pub is_stream: bool,
    pub request_protocol: Option<String>,
    pub supplier_protocol: Option<String>,
}

/// Filter and paging parameters for log queries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQuery {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub requested_model: Option<String>,
    pub provider_id: Option<i64>,
    pub api_key_id: Option<i64>,
    pub status_min: Option<u16>,
    pub status_max: Option<u16>,
    pub has_error: Option<bool>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

/// A page of log rows, newest first.
#[derive(Debug, Serialize)]
pub struct LogPage {
    pub items: Vec<RequestLog>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}
