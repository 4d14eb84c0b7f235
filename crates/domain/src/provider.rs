use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Wire protocol dialect spoken by an upstream provider (and by the ingress
/// endpoints that mirror it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    OpenAi,
    Anthropic,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(format!("unknown protocol: {s}")),
        }
    }
}

/// Kind of API the provider entry serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    Chat,
    Completion,
    Embedding,
}

impl ApiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Completion => "completion",
            Self::Embedding => "embedding",
        }
    }
}

/// A configured upstream provider.
///
/// `api_key` holds the plaintext once loaded; the store keeps it under the
/// field cipher and decrypts on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub protocol: Protocol,
    pub api_type: ApiType,
    pub api_key: Option<String>,
    pub extra_headers: Option<HashMap<String, String>>,
    pub proxy_enabled: bool,
    pub proxy_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a provider.
#[derive(Debug, Clone)]
pub struct NewProvider {
    pub name: String,
    pub base_url: String,
    pub protocol: Protocol,
    pub api_type: ApiType,
    pub api_key: Option<String>,
    pub extra_headers: Option<HashMap<String, String>>,
    pub proxy_enabled: bool,
    pub proxy_url: Option<String>,
    pub is_active: bool,
}

impl NewProvider {
    pub fn new(name: &str, base_url: &str, protocol: Protocol, api_type: ApiType) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            protocol,
            api_type,
            api_key: None,
            extra_headers: None,
            proxy_enabled: false,
            proxy_url: None,
            is_active: true,
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }
}

/// Partial update for a provider; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProviderPatch {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub protocol: Option<Protocol>,
    pub api_type: Option<ApiType>,
    pub api_key: Option<String>,
    pub extra_headers: Option<HashMap<String, String>>,
    pub proxy_enabled: Option<bool>,
    pub proxy_url: Option<String>,
    pub is_active: Option<bool>,
}
