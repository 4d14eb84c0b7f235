use crate::AppState;
use axum::{extract::State, http::Request, middleware::Next, response::Response};
use lgw_core::error::GatewayError;
use lgw_core::util::generate_trace_id;
use lgw_domain::log::NewRequestLog;

/// The authenticated client identity, injected as a request extension.
#[derive(Debug, Clone)]
pub struct AuthedKey {
    pub id: i64,
    pub name: String,
}

/// API-key authentication for the proxy surface.
///
/// `x-api-key` wins when both it and `Authorization: Bearer` are present.
/// Failures get a 401 and still produce a request log row (with a null
/// api_key_id) so rejected traffic is visible.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let token = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| strip_bearer(v))
        })
        .map(|t| t.to_string());

    let path = request.uri().path().to_string();

    let Some(token) = token else {
        return Err(auth_failure(&state, &path, "missing API key").await);
    };

    let api_key = match state.repos.api_keys.get_by_value(&token).await {
        Ok(key) => key,
        Err(e) => {
            tracing::error!("API key lookup failed: {e}");
            return Err(GatewayError::Internal("authentication unavailable".to_string()));
        }
    };

    let Some(api_key) = api_key else {
        return Err(auth_failure(&state, &path, "invalid API key").await);
    };
    if !api_key.is_active {
        return Err(auth_failure(&state, &path, "API key is disabled").await);
    }

    if let Err(e) = state
        .repos
        .api_keys
        .update_last_used(api_key.id, chrono::Utc::now())
        .await
    {
        tracing::warn!("failed to update api key last_used_at: {e}");
    }

    request.extensions_mut().insert(AuthedKey {
        id: api_key.id,
        name: api_key.key_name,
    });
    Ok(next.run(request).await)
}

/// Case-insensitive `Bearer ` prefix strip.
fn strip_bearer(value: &str) -> Option<&str> {
    let prefix = value.get(..7)?;
    if value.len() > 7 && prefix.eq_ignore_ascii_case("bearer ") {
        Some(&value[7..])
    } else {
        None
    }
}

async fn auth_failure(state: &AppState, path: &str, message: &str) -> GatewayError {
    let row = NewRequestLog {
        trace_id: generate_trace_id(),
        response_status: Some(401),
        error_info: Some(format!("authentication failed: {message} ({path})")),
        ..Default::default()
    };
    if let Err(e) = state.repos.logs.create(row).await {
        tracing::error!("failed to write auth failure log: {e}");
    }
    GatewayError::Authentication(message.to_string())
}
