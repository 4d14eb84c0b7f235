use crate::AppState;
use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use lgw_core::error::GatewayError;

/// List the configured model names (`GET /v1/models`). Synthesized from the
/// active model mappings, not proxied upstream.
pub async fn list_models(State(state): State<AppState>) -> Result<impl IntoResponse, GatewayError> {
    let mappings = state.repos.models.list_mappings(true).await?;

    let data: Vec<serde_json::Value> = mappings
        .into_iter()
        .map(|mapping| {
            serde_json::json!({
                "id": mapping.requested_model,
                "object": "model",
                "created": mapping.created_at.timestamp(),
                "owned_by": "system",
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "object": "list",
        "data": data,
    })))
}
