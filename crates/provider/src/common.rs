use crate::headers::STRIPPED_REQUEST_HEADERS;
use crate::{ForwardRequest, StreamedResponse, compose_upstream_url};
use bytes::Bytes;
use lgw_core::error::GatewayError;
use lgw_core::timer::Timer;
use lgw_domain::response::{ProviderResponse, ResponseBody, ResponseMode};
use serde_json::Value;
use std::collections::HashMap;
use tokio_stream::StreamExt;

/// Build a reqwest client for one attempt, honoring the provider's timeout
/// and optional egress proxy (http/socks5 only).
fn build_client(request: &ForwardRequest) -> Result<reqwest::Client, GatewayError> {
    let mut builder = reqwest::Client::builder().timeout(request.timeout);

    if let Some(ref proxy_url) = request.proxy_url {
        if !(proxy_url.starts_with("http://") || proxy_url.starts_with("socks5://")) {
            return Err(GatewayError::Validation(format!(
                "unsupported proxy scheme: {proxy_url}"
            )));
        }
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| GatewayError::Validation(format!("invalid proxy URL: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))
}

/// Prepare outgoing headers: strip client credentials and regenerated
/// headers, overlay provider extras, then force the JSON content type. The
/// protocol credential is installed by the caller.
pub(crate) fn prepare_headers(request: &ForwardRequest) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = request
        .headers
        .iter()
        .filter(|(key, _)| !STRIPPED_REQUEST_HEADERS.contains(&key.to_ascii_lowercase().as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    if let Some(ref extra) = request.extra_headers {
        for (key, value) in extra {
            headers.insert(key.clone(), value.clone());
        }
    }

    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers
}

/// Shallow-copy the body with only the `model` field replaced.
pub(crate) fn prepare_body(body: &Value, target_model: &str) -> Value {
    let mut prepared = body.clone();
    if let Some(obj) = prepared.as_object_mut() {
        obj.insert(
            "model".to_string(),
            Value::String(target_model.to_string()),
        );
    }
    prepared
}

pub(crate) fn extract_headers(resp: &reqwest::Response) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for (key, value) in resp.headers().iter() {
        if let Ok(v) = value.to_str() {
            headers.insert(key.as_str().to_string(), v.to_string());
        }
    }
    headers
}

/// Map a transport failure onto the synthesized status the retry layer
/// expects: timeout 504, request/connect 502, anything else 500.
fn transport_failure(e: &reqwest::Error) -> (u16, String) {
    if e.is_timeout() {
        (504, format!("Request timeout: {e}"))
    } else if e.is_builder() {
        (500, format!("Unexpected error: {e}"))
    } else {
        (502, format!("Request error: {e}"))
    }
}

fn build_request(
    request: &ForwardRequest,
    install_credential: impl FnOnce(&mut HashMap<String, String>),
) -> Result<reqwest::RequestBuilder, GatewayError> {
    let client = build_client(request)?;
    let url = compose_upstream_url(&request.base_url, &request.path);
    let body = prepare_body(&request.body, &request.target_model);

    let mut headers = prepare_headers(request);
    install_credential(&mut headers);

    let method = reqwest::Method::from_bytes(request.method.as_bytes())
        .map_err(|_| GatewayError::Validation(format!("invalid method: {}", request.method)))?;

    let mut req = client.request(method, &url);
    for (key, value) in &headers {
        req = req.header(key.as_str(), value.as_str());
    }

    tracing::debug!(url = %url, model = %request.target_model, "forwarding upstream request");
    Ok(req.json(&body))
}

/// Blocking forward shared by the protocol clients.
pub(crate) async fn forward(
    request: &ForwardRequest,
    mode: ResponseMode,
    install_credential: impl FnOnce(&mut HashMap<String, String>),
) -> ProviderResponse {
    let mut timer = Timer::start();

    let req = match build_request(request, install_credential) {
        Ok(req) => req,
        Err(e) => {
            timer.stop();
            return ProviderResponse::failure(500, e.to_string());
        }
    };

    match req.send().await {
        Ok(resp) => {
            timer.mark_first_byte();
            let status = resp.status().as_u16();
            let headers = extract_headers(&resp);
            match resp.bytes().await {
                Ok(bytes) => {
                    timer.stop();
                    let body = match mode {
                        ResponseMode::Raw => ResponseBody::Raw(bytes),
                        ResponseMode::Parsed => parse_body(&bytes),
                    };
                    ProviderResponse {
                        status,
                        headers,
                        body,
                        first_byte_delay_ms: timer.first_byte_delay_ms(),
                        total_time_ms: timer.total_time_ms(),
                        error: None,
                    }
                }
                Err(e) => {
                    timer.stop();
                    let (status, message) = transport_failure(&e);
                    failure_with_timing(status, message, &timer)
                }
            }
        }
        Err(e) => {
            timer.stop();
            let (status, message) = transport_failure(&e);
            failure_with_timing(status, message, &timer)
        }
    }
}

/// Streaming forward shared by the protocol clients: status and headers are
/// resolved eagerly, body bytes flow through as they arrive.
pub(crate) async fn forward_stream(
    request: &ForwardRequest,
    install_credential: impl FnOnce(&mut HashMap<String, String>),
) -> StreamedResponse {
    let req = match build_request(request, install_credential) {
        Ok(req) => req,
        Err(e) => return StreamedResponse::failure(500, e.to_string()),
    };

    match req.send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let headers = extract_headers(&resp);
            let stream = resp.bytes_stream().map(|chunk| {
                chunk.map_err(|e| {
                    if e.is_timeout() {
                        GatewayError::Timeout(format!("upstream stream timeout: {e}"))
                    } else {
                        GatewayError::Internal(format!("upstream stream error: {e}"))
                    }
                })
            });
            StreamedResponse {
                status,
                headers,
                error: None,
                stream: Box::pin(stream),
            }
        }
        Err(e) => {
            let (status, message) = transport_failure(&e);
            StreamedResponse::failure(status, message)
        }
    }
}

fn parse_body(bytes: &Bytes) -> ResponseBody {
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        return ResponseBody::Json(value);
    }
    ResponseBody::Json(Value::String(
        String::from_utf8_lossy(bytes).to_string(),
    ))
}

fn failure_with_timing(status: u16, message: String, timer: &Timer) -> ProviderResponse {
    let mut resp = ProviderResponse::failure(status, message);
    resp.first_byte_delay_ms = timer.first_byte_delay_ms();
    resp.total_time_ms = timer.total_time_ms();
    resp
}
