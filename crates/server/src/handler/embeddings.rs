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

/// OpenAI embeddings proxy (`POST /v1/embeddings`).
pub async fn embeddings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthedKey>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let body = super::parse_json_body(&body)?;
    let headers = super::headers_to_map(&headers);

    let (response, info) = proxy::process_request(
        &state,
        &auth,
        Protocol::OpenAi,
        "/v1/embeddings",
        "POST",
        headers,
        body,
    )
    .await?;
    Ok(super::build_proxy_response(response, &info))
}
