use crate::{ForwardRequest, ProviderClient, StreamedResponse, common};
use lgw_domain::provider::Protocol;
use lgw_domain::response::{ProviderResponse, ResponseMode};
use std::collections::HashMap;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for Anthropic-compatible upstreams (`/v1/messages`).
/// Authenticates with `x-api-key` and pins a default `anthropic-version`
/// unless the provider's extra headers already set one.
pub struct AnthropicClient;

fn install_credential(api_key: Option<&str>) -> impl FnOnce(&mut HashMap<String, String>) + '_ {
    move |headers| {
        if let Some(key) = api_key {
            headers.insert("x-api-key".to_string(), key.to_string());
        }
        let has_version = headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("anthropic-version"));
        if !has_version {
            headers.insert(
                "anthropic-version".to_string(),
                ANTHROPIC_VERSION.to_string(),
            );
        }
    }
}

#[async_trait::async_trait]
impl ProviderClient for AnthropicClient {
    fn protocol(&self) -> Protocol {
        Protocol::Anthropic
    }

    async fn forward(&self, request: &ForwardRequest, mode: ResponseMode) -> ProviderResponse {
        common::forward(request, mode, install_credential(request.api_key.as_deref())).await
    }

    async fn forward_stream(&self, request: &ForwardRequest) -> StreamedResponse {
        common::forward_stream(request, install_credential(request.api_key.as_deref())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_header_and_default_version() {
        let mut headers = HashMap::new();
        install_credential(Some("sk-ant-key"))(&mut headers);
        assert_eq!(headers.get("x-api-key").map(String::as_str), Some("sk-ant-key"));
        assert_eq!(
            headers.get("anthropic-version").map(String::as_str),
            Some(ANTHROPIC_VERSION)
        );
    }

    #[test]
    fn test_existing_version_not_overridden() {
        let mut headers =
            HashMap::from([("Anthropic-Version".to_string(), "2024-01-01".to_string())]);
        install_credential(Some("sk-ant-key"))(&mut headers);
        assert_eq!(
            headers.get("Anthropic-Version").map(String::as_str),
            Some("2024-01-01")
        );
        assert!(!headers.contains_key("anthropic-version"));
    }
}
