use crate::AppState;
use crate::auth::AuthedKey;
use crate::retry::RetryHandler;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use lgw_core::error::GatewayError;
use lgw_core::rules::RuleEngine;
use lgw_core::sanitize::sanitize_headers;
use lgw_core::timer::Timer;
use lgw_core::tokens::count_request;
use lgw_core::util::{generate_trace_id, response_body_for_log, truncate_json};
use lgw_domain::context::{RuleContext, TokenUsage};
use lgw_domain::log::NewRequestLog;
use lgw_domain::provider::Protocol;
use lgw_domain::response::{ProviderResponse, ResponseMode};
use lgw_domain::rules::CandidateProvider;
use lgw_provider::headers::filter_upstream_headers;
use lgw_provider::usage::{StreamUsageAccumulator, extract_output_tokens};
use lgw_provider::{ForwardRequest, StreamedResponse};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// Chunk channel capacity for the streaming tee. Small on purpose: the
/// upstream read is throttled by the slower of the client and the
/// accumulator, never buffering the response.
const STREAM_CHANNEL_CAPACITY: usize = 16;

/// Cap on captured error-body bytes for the log when a stream opens with a
/// non-success status.
const ERROR_BODY_CAPTURE_LIMIT: usize = 8 * 1024;

/// Correlation info the ingress handler puts on the downstream response.
#[derive(Debug, Clone, Default)]
pub struct LogInfo {
    pub trace_id: String,
    pub target_model: String,
    pub provider_name: String,
}

/// A started streaming response: status and headers up front, body chunks
/// from the tee. The request log is written when the stream closes.
pub struct StreamHandle {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub chunks: mpsc::Receiver<Bytes>,
    pub log: LogInfo,
}

struct Prepared {
    trace_id: String,
    timer: Timer,
    requested_model: String,
    candidates: Vec<CandidateProvider>,
    log: NewRequestLog,
}

/// Resolve the mapping, build the rule context, evaluate candidates.
/// Failures write their own request-log row before surfacing.
async fn prepare(
    state: &AppState,
    auth: &AuthedKey,
    request_protocol: Protocol,
    headers: &HashMap<String, String>,
    body: &Value,
    is_stream: bool,
) -> Result<Prepared, GatewayError> {
    let trace_id = generate_trace_id();
    let timer = Timer::start();

    let mut log = NewRequestLog {
        trace_id: trace_id.clone(),
        request_time: Some(Utc::now()),
        api_key_id: Some(auth.id),
        api_key_name: Some(auth.name.clone()),
        request_headers: serde_json::to_value(sanitize_headers(headers)).ok(),
        request_body: Some(truncate_json(body)),
        is_stream,
        request_protocol: Some(request_protocol.as_str().to_string()),
        ..Default::default()
    };

    let Some(requested_model) = body.get("model").and_then(|m| m.as_str()).map(str::to_string)
    else {
        let err = GatewayError::Validation("missing model field".to_string());
        return Err(fail(state, log, timer, err).await);
    };
    log.requested_model = Some(requested_model.clone());

    let mapping = state.repos.models.get_mapping(&requested_model).await?;
    let Some(mapping) = mapping.filter(|m| m.is_active) else {
        let err = GatewayError::NotFound(format!("model not configured: {requested_model}"));
        return Err(fail(state, log, timer, err).await);
    };

    let input_tokens = count_request(request_protocol, body);
    log.input_tokens = Some(input_tokens);

    let ctx = RuleContext {
        current_model: requested_model.clone(),
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect(),
        request_body: body.clone(),
        token_usage: TokenUsage {
            input_tokens,
            output_tokens: 0,
        },
    };

    let links = state.repos.models.list_links(&requested_model, true).await?;
    let provider_ids: Vec<i64> = links.iter().map(|l| l.provider_id).collect();
    let providers = state.repos.providers.get_many(&provider_ids).await?;
    let candidates = RuleEngine::evaluate(&ctx, &mapping, &links, &providers);

    log.matched_provider_count = Some(candidates.len() as u32);
    if candidates.is_empty() {
        let err =
            GatewayError::Service(format!("no available providers for model {requested_model}"));
        return Err(fail(state, log, timer, err).await);
    }

    Ok(Prepared {
        trace_id,
        timer,
        requested_model,
        candidates,
        log,
    })
}

/// Finalize and write the log row for a request that failed before any
/// upstream forward, then hand the error back.
async fn fail(
    state: &AppState,
    mut log: NewRequestLog,
    mut timer: Timer,
    err: GatewayError,
) -> GatewayError {
    timer.stop();
    log.response_status = Some(err.status_code().as_u16());
    log.first_byte_delay_ms = timer.first_byte_delay_ms();
    log.total_time_ms = timer.total_time_ms();
    log.error_info = Some(err.to_string());
    write_log(state, log).await;
    err
}

/// Log writes never break the request path.
async fn write_log(state: &AppState, log: NewRequestLog) {
    if let Err(e) = state.repos.logs.create(log).await {
        tracing::error!("failed to write request log: {e}");
    }
}

fn fill_provider_fields(log: &mut NewRequestLog, provider: Option<&CandidateProvider>) {
    if let Some(provider) = provider {
        log.target_model = Some(provider.target_model.clone());
        log.provider_id = Some(provider.provider_id);
        log.provider_name = Some(provider.provider_name.clone());
        log.supplier_protocol = Some(provider.protocol.as_str().to_string());
    }
}

fn log_info_for(trace_id: &str, provider: Option<&CandidateProvider>) -> LogInfo {
    LogInfo {
        trace_id: trace_id.to_string(),
        target_model: provider.map(|p| p.target_model.clone()).unwrap_or_default(),
        provider_name: provider
            .map(|p| p.provider_name.clone())
            .unwrap_or_default(),
    }
}

/// One blocking forward to a candidate, with protocol-aware mode selection:
/// byte-exact passthrough when the dialects match, parsed (through the
/// translation adapter) when they differ.
async fn forward_once(
    state: &AppState,
    request_protocol: Protocol,
    path: &str,
    method: &str,
    headers: HashMap<String, String>,
    body: Value,
    timeout: Duration,
    candidate: CandidateProvider,
) -> ProviderResponse {
    let Some(client) = state.clients.get(candidate.protocol) else {
        return ProviderResponse::failure(
            500,
            format!("no client registered for protocol {}", candidate.protocol),
        );
    };

    let same_dialect = request_protocol == candidate.protocol;
    let (path, body, mode) = if same_dialect {
        (path.to_string(), body, ResponseMode::Raw)
    } else {
        let (path, body) =
            state
                .adapter
                .adapt_request(request_protocol, candidate.protocol, path, &body);
        (path, body, ResponseMode::Parsed)
    };

    let request = ForwardRequest::for_candidate(&candidate, &path, method, headers, body, timeout);
    client.forward(&request, mode).await
}

async fn forward_stream_once(
    state: &AppState,
    request_protocol: Protocol,
    path: &str,
    method: &str,
    headers: HashMap<String, String>,
    body: Value,
    timeout: Duration,
    candidate: CandidateProvider,
) -> StreamedResponse {
    let Some(client) = state.clients.get(candidate.protocol) else {
        return StreamedResponse::failure(
            500,
            format!("no client registered for protocol {}", candidate.protocol),
        );
    };

    let same_dialect = request_protocol == candidate.protocol;
    let (path, body) = if same_dialect {
        (path.to_string(), body)
    } else {
        state
            .adapter
            .adapt_request(request_protocol, candidate.protocol, path, &body)
    };

    let request = ForwardRequest::for_candidate(&candidate, &path, method, headers, body, timeout);
    client.forward_stream(&request).await
}

/// Process one non-streaming proxy request end to end: candidate selection,
/// the retry/failover loop, token accounting and exactly one log row.
pub async fn process_request(
    state: &AppState,
    auth: &AuthedKey,
    request_protocol: Protocol,
    path: &str,
    method: &str,
    headers: HashMap<String, String>,
    body: Value,
) -> Result<(ProviderResponse, LogInfo), GatewayError> {
    let mut prepared = prepare(state, auth, request_protocol, &headers, &body, false).await?;

    let timeout = Duration::from_secs(state.config.http_timeout_secs);
    let handler = RetryHandler::new(state.config.retry.max_attempts, state.config.retry.delay_ms);

    let forward = |candidate: CandidateProvider| {
        let headers = headers.clone();
        let body = body.clone();
        async move {
            forward_once(
                state,
                request_protocol,
                path,
                method,
                headers,
                body,
                timeout,
                candidate,
            )
            .await
        }
    };

    let outcome = handler
        .run(
            &prepared.candidates,
            &prepared.requested_model,
            state.strategy.as_ref(),
            forward,
        )
        .await;

    prepared.timer.stop();
    let response = outcome.response;
    let log_info = log_info_for(&prepared.trace_id, outcome.provider.as_ref());

    let mut log = prepared.log;
    fill_provider_fields(&mut log, outcome.provider.as_ref());
    log.retry_count = outcome.retry_count;
    log.response_status = Some(response.status);
    log.response_body = response_body_for_log(&response.body);
    log.response_headers = serde_json::to_value(filter_upstream_headers(&response.headers)).ok();
    log.output_tokens = extract_output_tokens(&response.body);
    log.error_info = response.error.clone();
    log.first_byte_delay_ms = response
        .first_byte_delay_ms
        .or(prepared.timer.first_byte_delay_ms());
    log.total_time_ms = prepared.timer.total_time_ms();
    write_log(state, log).await;

    Ok((response, log_info))
}

/// Process one streaming proxy request: bootstrap the upstream stream
/// through the retry loop, then tee every chunk to the client and to the
/// usage accumulator. The log row is written when the stream closes, on
/// success, upstream error or client disconnect alike.
pub async fn process_request_stream(
    state: &AppState,
    auth: &AuthedKey,
    request_protocol: Protocol,
    path: &str,
    method: &str,
    headers: HashMap<String, String>,
    body: Value,
) -> Result<StreamHandle, GatewayError> {
    let prepared = prepare(state, auth, request_protocol, &headers, &body, true).await?;

    let timeout = Duration::from_secs(state.config.http_timeout_secs);
    let handler = RetryHandler::new(state.config.retry.max_attempts, state.config.retry.delay_ms);

    let forward = |candidate: CandidateProvider| {
        let headers = headers.clone();
        let body = body.clone();
        async move {
            forward_stream_once(
                state,
                request_protocol,
                path,
                method,
                headers,
                body,
                timeout,
                candidate,
            )
            .await
        }
    };

    let outcome = handler
        .run(
            &prepared.candidates,
            &prepared.requested_model,
            state.strategy.as_ref(),
            forward,
        )
        .await;

    let streamed = outcome.response;
    let log_info = log_info_for(&prepared.trace_id, outcome.provider.as_ref());

    let mut out_headers = filter_upstream_headers(&streamed.headers);
    out_headers.insert("X-Trace-ID".to_string(), log_info.trace_id.clone());
    out_headers.insert("X-Target-Model".to_string(), log_info.target_model.clone());
    out_headers.insert("X-Provider".to_string(), log_info.provider_name.clone());

    let supplier_protocol = outcome
        .provider
        .as_ref()
        .map(|p| p.protocol)
        .unwrap_or(request_protocol);

    let mut log = prepared.log;
    fill_provider_fields(&mut log, outcome.provider.as_ref());
    log.retry_count = outcome.retry_count;
    log.response_status = Some(streamed.status);
    log.response_headers = serde_json::to_value(filter_upstream_headers(&streamed.headers)).ok();
    log.error_info = streamed.error.clone();

    let success = streamed.is_success();
    let trace_id = prepared.trace_id.clone();
    let mut accumulator =
        StreamUsageAccumulator::new(supplier_protocol, &log_info.target_model);
    let mut timer = prepared.timer;
    let mut stream = streamed.stream;
    let state_for_log = state.clone();
    let (tx, rx) = mpsc::channel::<Bytes>(STREAM_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut error_body: Vec<u8> = Vec::new();
        let mut stream_error: Option<String> = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    timer.mark_first_byte();
                    if success {
                        accumulator.feed(&chunk);
                    } else if error_body.len() < ERROR_BODY_CAPTURE_LIMIT {
                        error_body.extend_from_slice(&chunk);
                    }
                    if tx.send(chunk).await.is_err() {
                        tracing::debug!(trace_id = %trace_id, "client disconnected during stream");
                        break;
                    }
                }
                Err(e) => {
                    stream_error = Some(e.to_string());
                    break;
                }
            }
        }

        // Closes the upstream connection before the log write.
        drop(stream);
        timer.stop();

        let usage = accumulator.finalize();
        log.first_byte_delay_ms = timer.first_byte_delay_ms();
        log.total_time_ms = timer.total_time_ms();
        if success {
            log.output_tokens = Some(usage.output_tokens);
            if !usage.output_preview.is_empty() {
                log.response_body = Some(Value::String(usage.output_preview));
            }
        } else if !error_body.is_empty() {
            log.response_body = Some(Value::String(
                String::from_utf8_lossy(&error_body).to_string(),
            ));
        }
        if let Some(stream_error) = stream_error {
            log.error_info = Some(stream_error);
        }
        write_log(&state_for_log, log).await;
    });

    Ok(StreamHandle {
        status: streamed.status,
        headers: out_headers,
        chunks: rx,
        log: log_info,
    })
}
