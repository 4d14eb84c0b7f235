pub mod anthropic;
pub mod headers;
pub mod openai;
pub mod sse;
pub mod usage;

mod common;

use bytes::Bytes;
use futures::Stream;
use lgw_core::error::GatewayError;
use lgw_domain::provider::Protocol;
use lgw_domain::response::{ProviderResponse, ResponseMode};
use lgw_domain::rules::CandidateProvider;
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Everything one upstream attempt needs.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub base_url: String,
    pub api_key: Option<String>,
    pub extra_headers: Option<HashMap<String, String>>,
    /// Ingress path, e.g. `/v1/chat/completions`.
    pub path: String,
    pub method: String,
    /// Ingress request headers (credentials are stripped before sending).
    pub headers: HashMap<String, String>,
    pub body: Value,
    pub target_model: String,
    pub timeout: Duration,
    pub proxy_url: Option<String>,
}

impl ForwardRequest {
    pub fn for_candidate(
        candidate: &CandidateProvider,
        path: &str,
        method: &str,
        headers: HashMap<String, String>,
        body: Value,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: candidate.base_url.clone(),
            api_key: candidate.api_key.clone(),
            extra_headers: candidate.extra_headers.clone(),
            path: path.to_string(),
            method: method.to_string(),
            headers,
            body,
            target_model: candidate.target_model.clone(),
            timeout,
            proxy_url: if candidate.proxy_enabled {
                candidate.proxy_url.clone()
            } else {
                None
            },
        }
    }
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, GatewayError>> + Send>>;

/// The opening of a streamed upstream response: status and headers up front,
/// body bytes as they arrive. Transport failures before the first byte are
/// represented as a synthesized failure with an empty stream.
pub struct StreamedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub error: Option<String>,
    pub stream: ByteStream,
}

impl StreamedResponse {
    pub fn failure(status: u16, error: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            error: Some(error.into()),
            stream: Box::pin(futures::stream::empty()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// One HTTP request to an upstream provider, blocking or streaming.
/// Implementations never error at the call boundary: transport failures are
/// mapped onto synthesized 502/504/500 responses for the retry layer.
#[async_trait::async_trait]
pub trait ProviderClient: Send + Sync {
    fn protocol(&self) -> Protocol;

    async fn forward(&self, request: &ForwardRequest, mode: ResponseMode) -> ProviderResponse;

    async fn forward_stream(&self, request: &ForwardRequest) -> StreamedResponse;
}

/// One client per protocol, shared across requests.
pub struct ClientRegistry {
    clients: HashMap<Protocol, Arc<dyn ProviderClient>>,
}

impl ClientRegistry {
    pub fn get(&self, protocol: Protocol) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(&protocol).cloned()
    }
}

pub fn build_registry() -> ClientRegistry {
    let mut clients: HashMap<Protocol, Arc<dyn ProviderClient>> = HashMap::new();
    clients.insert(Protocol::OpenAi, Arc::new(openai::OpenAiClient));
    clients.insert(Protocol::Anthropic, Arc::new(anthropic::AnthropicClient));
    ClientRegistry { clients }
}

/// Join a provider base URL and an ingress path.
///
/// The gateway exposes `/v1/<suffix>` while `base_url` may or may not
/// already end in `/v1`, so a leading `/v1` is stripped from the path and
/// the trailing slash from the base:
///   base `https://x/v1` + path `/v1/p` -> `https://x/v1/p`
///   base `https://x`    + path `/v1/p` -> `https://x/p`
pub fn compose_upstream_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let suffix = if let Some(rest) = path.strip_prefix("/v1/") {
        format!("/{rest}")
    } else if path == "/v1" {
        String::new()
    } else {
        path.to_string()
    };
    format!("{base}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_composition() {
        assert_eq!(
            compose_upstream_url("https://api.openai.com/v1", "/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            compose_upstream_url("https://api.openai.com", "/v1/chat/completions"),
            "https://api.openai.com/chat/completions"
        );
        assert_eq!(compose_upstream_url("https://x/v1", "/v1/p"), "https://x/v1/p");
        assert_eq!(compose_upstream_url("https://x", "/v1/p"), "https://x/p");
        assert_eq!(compose_upstream_url("https://x/", "/p"), "https://x/p");
        assert_eq!(compose_upstream_url("https://x", "/v1"), "https://x");
    }

    #[test]
    fn test_forward_request_proxy_requires_enabled_flag() {
        let mut candidate = CandidateProvider {
            provider_id: 1,
            provider_name: "p".into(),
            base_url: "https://x".into(),
            protocol: Protocol::OpenAi,
            api_key: None,
            extra_headers: None,
            proxy_enabled: false,
            proxy_url: Some("socks5://127.0.0.1:1080".into()),
            target_model: "m".into(),
            priority: 0,
            weight: 1,
        };

        let req = ForwardRequest::for_candidate(
            &candidate,
            "/v1/chat/completions",
            "POST",
            HashMap::new(),
            serde_json::json!({}),
            Duration::from_secs(60),
        );
        assert!(req.proxy_url.is_none());

        candidate.proxy_enabled = true;
        let req = ForwardRequest::for_candidate(
            &candidate,
            "/v1/chat/completions",
            "POST",
            HashMap::new(),
            serde_json::json!({}),
            Duration::from_secs(60),
        );
        assert_eq!(req.proxy_url.as_deref(), Some("socks5://127.0.0.1:1080"));
    }

    #[test]
    fn test_registry_covers_both_protocols() {
        let registry = build_registry();
        assert!(registry.get(Protocol::OpenAi).is_some());
        assert!(registry.get(Protocol::Anthropic).is_some());
        assert_eq!(
            registry.get(Protocol::Anthropic).unwrap().protocol(),
            Protocol::Anthropic
        );
    }
}
