pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lgw_core::crypto::Encryption;
use lgw_core::error::GatewayError;
use lgw_domain::api_key::ApiKey;
use lgw_domain::log::{LogPage, LogQuery, NewRequestLog, RequestLog};
use lgw_domain::mapping::{
    ModelMapping, ModelMappingProvider, NewModelMapping, NewModelMappingProvider,
};
use lgw_domain::provider::{NewProvider, Provider, ProviderPatch};
use std::collections::HashMap;
use std::sync::Arc;

/// Persistence contract for providers. Implementations encrypt `api_key` on
/// write and decrypt on read; callers only ever see plaintext.
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn create(&self, data: NewProvider) -> Result<Provider, GatewayError>;
    async fn get(&self, id: i64) -> Result<Option<Provider>, GatewayError>;
    async fn get_by_name(&self, name: &str) -> Result<Option<Provider>, GatewayError>;
    /// Batch fetch, keyed by id. Missing ids are simply absent.
    async fn get_many(&self, ids: &[i64]) -> Result<HashMap<i64, Provider>, GatewayError>;
    async fn list(&self, active_only: bool) -> Result<Vec<Provider>, GatewayError>;
    async fn update(&self, id: i64, patch: ProviderPatch) -> Result<Option<Provider>, GatewayError>;
    /// Fails with a conflict while model mappings still reference the provider.
    async fn delete(&self, id: i64) -> Result<bool, GatewayError>;
}

/// Persistence contract for model mappings and their provider links.
#[async_trait]
pub trait ModelRepository: Send + Sync {
    async fn create_mapping(&self, data: NewModelMapping) -> Result<ModelMapping, GatewayError>;
    async fn get_mapping(&self, requested_model: &str)
    -> Result<Option<ModelMapping>, GatewayError>;
    async fn list_mappings(&self, active_only: bool) -> Result<Vec<ModelMapping>, GatewayError>;
    /// Deleting a mapping cascades to its provider links.
    async fn delete_mapping(&self, requested_model: &str) -> Result<bool, GatewayError>;

    async fn add_link(
        &self,
        data: NewModelMappingProvider,
    ) -> Result<ModelMappingProvider, GatewayError>;
    /// Links for one requested model, in insertion order.
    async fn list_links(
        &self,
        requested_model: &str,
        active_only: bool,
    ) -> Result<Vec<ModelMappingProvider>, GatewayError>;
    async fn delete_link(&self, id: i64) -> Result<bool, GatewayError>;
    async fn provider_has_links(&self, provider_id: i64) -> Result<bool, GatewayError>;
}

/// Persistence contract for client API keys.
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn create(&self, key_name: &str, key_value: &str) -> Result<ApiKey, GatewayError>;
    async fn get(&self, id: i64) -> Result<Option<ApiKey>, GatewayError>;
    /// Lookup by the plaintext token, for ingress authentication.
    async fn get_by_value(&self, key_value: &str) -> Result<Option<ApiKey>, GatewayError>;
    async fn list(&self) -> Result<Vec<ApiKey>, GatewayError>;
    async fn set_active(&self, id: i64, is_active: bool) -> Result<bool, GatewayError>;
    async fn update_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<(), GatewayError>;
    async fn delete(&self, id: i64) -> Result<bool, GatewayError>;
}

/// Persistence contract for request logs (append-only).
#[async_trait]
pub trait LogRepository: Send + Sync {
    async fn create(&self, data: NewRequestLog) -> Result<RequestLog, GatewayError>;
    async fn get(&self, id: i64) -> Result<Option<RequestLog>, GatewayError>;
    async fn query(&self, query: &LogQuery) -> Result<LogPage, GatewayError>;
    /// Delete rows older than the retention window; returns the count.
    async fn cleanup_old_logs(&self, retention_days: u32) -> Result<u64, GatewayError>;
}

/// The repository bundle the gateway consumes. Cheap to clone.
#[derive(Clone)]
pub struct Repositories {
    pub providers: Arc<dyn ProviderRepository>,
    pub models: Arc<dyn ModelRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
    pub logs: Arc<dyn LogRepository>,
}

impl Repositories {
    /// The in-memory reference store. External SQL-backed implementations
    /// plug in through the same traits.
    pub fn in_memory(encryption: Arc<Encryption>) -> Self {
        let store = Arc::new(memory::MemoryStore::new(encryption));
        Self {
            providers: store.clone(),
            models: store.clone(),
            api_keys: store.clone(),
            logs: store,
        }
    }
}
