pub mod chat_completions;
pub mod completions;
pub mod embeddings;
pub mod health;
pub mod messages;
pub mod models;

use crate::proxy::{LogInfo, StreamHandle};
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use futures::StreamExt;
use lgw_core::error::GatewayError;
use lgw_domain::response::{ProviderResponse, ResponseBody};
use lgw_provider::headers::filter_upstream_headers;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;

pub(crate) fn parse_json_body(body: &Bytes) -> Result<Value, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::Validation(format!("invalid JSON body: {e}")))
}

pub(crate) fn wants_stream(body: &Value) -> bool {
    body.get("stream").and_then(|s| s.as_bool()).unwrap_or(false)
}

pub(crate) fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (key, value) in headers.iter() {
        if let Ok(v) = value.to_str() {
            map.insert(key.as_str().to_string(), v.to_string());
        }
    }
    map
}

fn insert_header(response: &mut Response, key: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(key.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        response.headers_mut().insert(name, value);
    }
}

fn insert_trace_headers(response: &mut Response, info: &LogInfo) {
    insert_header(response, "X-Trace-ID", &info.trace_id);
    insert_header(response, "X-Target-Model", &info.target_model);
    insert_header(response, "X-Provider", &info.provider_name);
}

/// Build the downstream response for a non-streaming proxied request:
/// upstream body as captured, hop-filtered upstream headers plus trace
/// headers on success, a plain JSON error body otherwise.
pub(crate) fn build_proxy_response(response: ProviderResponse, info: &LogInfo) -> Response {
    let success = response.is_success();
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let body_bytes: Bytes = match response.body {
        ResponseBody::Raw(bytes) => bytes,
        ResponseBody::Json(value) => Bytes::from(serde_json::to_vec(&value).unwrap_or_default()),
        ResponseBody::Empty => {
            let message = response
                .error
                .clone()
                .unwrap_or_else(|| "upstream error".to_string());
            Bytes::from(
                json!({"error": {"message": message, "type": "upstream_error"}}).to_string(),
            )
        }
    };

    let mut out = Response::new(Body::from(body_bytes));
    *out.status_mut() = status;

    if success {
        for (key, value) in filter_upstream_headers(&response.headers) {
            insert_header(&mut out, &key, &value);
        }
        insert_trace_headers(&mut out, info);
    }

    if !out.headers().contains_key(header::CONTENT_TYPE) {
        out.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }
    out
}

/// Build the downstream response for a streaming request. A successful
/// upstream opens a chunked passthrough; a failed one is collected into a
/// single JSON response so the client never sees a broken event stream.
pub(crate) async fn build_stream_response(handle: StreamHandle) -> Response {
    let status = StatusCode::from_u16(handle.status).unwrap_or(StatusCode::BAD_GATEWAY);

    if (200..400).contains(&handle.status) {
        let stream = ReceiverStream::new(handle.chunks).map(Ok::<Bytes, Infallible>);
        let mut out = Response::new(Body::from_stream(stream));
        *out.status_mut() = status;
        for (key, value) in &handle.headers {
            insert_header(&mut out, key, value);
        }
        if !out.headers().contains_key(header::CONTENT_TYPE) {
            out.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/event-stream"),
            );
        }
        return out;
    }

    // Collect the error body and return it as one JSON response.
    let mut chunks = handle.chunks;
    let mut collected = Vec::new();
    while let Some(chunk) = chunks.recv().await {
        collected.extend_from_slice(&chunk);
    }
    let body: Value = serde_json::from_slice(&collected).unwrap_or_else(|_| {
        json!({"error": {"message": String::from_utf8_lossy(&collected).to_string()}})
    });

    let mut out = Response::new(Body::from(body.to_string()));
    *out.status_mut() = status;
    insert_trace_headers(&mut out, &handle.log);
    out.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    out
}
