use crate::AppState;
use crate::auth::AuthedKey;
use crate::proxy;
use axum::Extension;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::Bytes;
use lgw_core::error::GatewayError;
use lgw_domain::provider::Protocol;

/// Anthropic messages proxy (`POST /v1/messages`), blocking and streaming.
pub async fn messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthedKey>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let body = super::parse_json_body(&body)?;
    let headers = super::headers_to_map(&headers);

    if super::wants_stream(&body) {
        let handle = proxy::process_request_stream(
            &state,
            &auth,
            Protocol::Anthropic,
            "/v1/messages",
            "POST",
            headers,
            body,
        )
        .await?;
        return Ok(super::build_stream_response(handle).await);
    }

    let (response, info) = proxy::process_request(
        &state,
        &auth,
        Protocol::Anthropic,
        "/v1/messages",
        "POST",
        headers,
        body,
    )
    .await?;
    Ok(super::build_proxy_response(response, &info))
}
