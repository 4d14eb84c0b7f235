use crate::{ForwardRequest, ProviderClient, StreamedResponse, common};
use lgw_domain::provider::Protocol;
use lgw_domain::response::{ProviderResponse, ResponseMode};
use std::collections::HashMap;

/// Client for OpenAI-compatible upstreams: chat, text completions and
/// embeddings. Authenticates with `Authorization: Bearer`.
pub struct OpenAiClient;

fn install_credential(api_key: Option<&str>) -> impl FnOnce(&mut HashMap<String, String>) + '_ {
    move |headers| {
        if let Some(key) = api_key {
            headers.insert("Authorization".to_string(), format!("Bearer {key}"));
        }
    }
}

#[async_trait::async_trait]
impl ProviderClient for OpenAiClient {
    fn protocol(&self) -> Protocol {
        Protocol::OpenAi
    }

    async fn forward(&self, request: &ForwardRequest, mode: ResponseMode) -> ProviderResponse {
        common::forward(request, mode, install_credential(request.api_key.as_deref())).await
    }

    async fn forward_stream(&self, request: &ForwardRequest) -> StreamedResponse {
        common::forward_stream(request, install_credential(request.api_key.as_deref())).await
    }
}
