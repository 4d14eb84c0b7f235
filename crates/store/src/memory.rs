use crate::{ApiKeyRepository, LogRepository, ModelRepository, ProviderRepository};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lgw_core::crypto::Encryption;
use lgw_core::error::GatewayError;
use lgw_domain::api_key::ApiKey;
use lgw_domain::log::{LogPage, LogQuery, NewRequestLog, RequestLog};
use lgw_domain::mapping::{
    ModelMapping, ModelMappingProvider, NewModelMapping, NewModelMappingProvider,
};
use lgw_domain::provider::{NewProvider, Provider, ProviderPatch};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory reference store. Provider API keys are held encrypted, exactly
/// as a database row would be, and decrypted on every read.
pub struct MemoryStore {
    encryption: Arc<Encryption>,
    providers: RwLock<Vec<Provider>>,
    mappings: RwLock<Vec<ModelMapping>>,
    links: RwLock<Vec<ModelMappingProvider>>,
    api_keys: RwLock<Vec<ApiKey>>,
    logs: RwLock<Vec<RequestLog>>,
    provider_seq: AtomicI64,
    link_seq: AtomicI64,
    api_key_seq: AtomicI64,
    log_seq: AtomicI64,
}

impl MemoryStore {
    pub fn new(encryption: Arc<Encryption>) -> Self {
        Self {
            encryption,
            providers: RwLock::new(Vec::new()),
            mappings: RwLock::new(Vec::new()),
            links: RwLock::new(Vec::new()),
            api_keys: RwLock::new(Vec::new()),
            logs: RwLock::new(Vec::new()),
            provider_seq: AtomicI64::new(1),
            link_seq: AtomicI64::new(1),
            api_key_seq: AtomicI64::new(1),
            log_seq: AtomicI64::new(1),
        }
    }

    fn decrypt_provider(&self, provider: &Provider) -> Result<Provider, GatewayError> {
        let mut out = provider.clone();
        if let Some(ref stored) = out.api_key {
            out.api_key = Some(self.encryption.decrypt(stored)?);
        }
        Ok(out)
    }

    fn encrypt_key(&self, api_key: Option<String>) -> Result<Option<String>, GatewayError> {
        match api_key {
            // Guard against double encryption of values that are already stored form.
            Some(key) if !Encryption::is_encrypted(&key) => Ok(Some(self.encryption.encrypt(&key)?)),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl ProviderRepository for MemoryStore {
    async fn create(&self, data: NewProvider) -> Result<Provider, GatewayError> {
        let mut providers = self.providers.write().expect("providers lock");
        if providers.iter().any(|p| p.name == data.name) {
            return Err(GatewayError::Conflict(format!(
                "provider name already exists: {}",
                data.name
            )));
        }

        let now = Utc::now();
        let provider = Provider {
            id: self.provider_seq.fetch_add(1, Ordering::Relaxed),
            name: data.name,
            base_url: data.base_url,
            protocol: data.protocol,
            api_type: data.api_type,
            api_key: self.encrypt_key(data.api_key)?,
            extra_headers: data.extra_headers,
            proxy_enabled: data.proxy_enabled,
            proxy_url: data.proxy_url,
            is_active: data.is_active,
            created_at: now,
            updated_at: now,
        };
        providers.push(provider.clone());
        drop(providers);

        self.decrypt_provider(&provider)
    }

    async fn get(&self, id: i64) -> Result<Option<Provider>, GatewayError> {
        let providers = self.providers.read().expect("providers lock");
        providers
            .iter()
            .find(|p| p.id == id)
            .map(|p| self.decrypt_provider(p))
            .transpose()
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Provider>, GatewayError> {
        let providers = self.providers.read().expect("providers lock");
        providers
            .iter()
            .find(|p| p.name == name)
            .map(|p| self.decrypt_provider(p))
            .transpose()
    }

    async fn get_many(&self, ids: &[i64]) -> Result<HashMap<i64, Provider>, GatewayError> {
        let providers = self.providers.read().expect("providers lock");
        let mut out = HashMap::new();
        for provider in providers.iter().filter(|p| ids.contains(&p.id)) {
            out.insert(provider.id, self.decrypt_provider(provider)?);
        }
        Ok(out)
    }

    async fn list(&self, active_only: bool) -> Result<Vec<Provider>, GatewayError> {
        let providers = self.providers.read().expect("providers lock");
        providers
            .iter()
            .filter(|p| !active_only || p.is_active)
            .map(|p| self.decrypt_provider(p))
            .collect()
    }

    async fn update(
        &self,
        id: i64,
        patch: ProviderPatch,
    ) -> Result<Option<Provider>, GatewayError> {
        let encrypted_key = self.encrypt_key(patch.api_key)?;
        let mut providers = self.providers.write().expect("providers lock");

        if let Some(ref name) = patch.name
            && providers.iter().any(|p| p.name == *name && p.id != id)
        {
            return Err(GatewayError::Conflict(format!(
                "provider name already exists: {name}"
            )));
        }

        let Some(provider) = providers.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };

        if let Some(name) = patch.name {
            provider.name = name;
        }
        if let Some(base_url) = patch.base_url {
            provider.base_url = base_url;
        }
        if let Some(protocol) = patch.protocol {
            provider.protocol = protocol;
        }
        if let Some(api_type) = patch.api_type {
            provider.api_type = api_type;
        }
        if let Some(key) = encrypted_key {
            provider.api_key = Some(key);
        }
        if let Some(extra_headers) = patch.extra_headers {
            provider.extra_headers = Some(extra_headers);
        }
        if let Some(proxy_enabled) = patch.proxy_enabled {
            provider.proxy_enabled = proxy_enabled;
        }
        if let Some(proxy_url) = patch.proxy_url {
            provider.proxy_url = Some(proxy_url);
        }
        if let Some(is_active) = patch.is_active {
            provider.is_active = is_active;
        }
        provider.updated_at = Utc::now();

        let updated = provider.clone();
        drop(providers);
        Ok(Some(self.decrypt_provider(&updated)?))
    }

    async fn delete(&self, id: i64) -> Result<bool, GatewayError> {
        if self.provider_has_links(id).await? {
            return Err(GatewayError::Conflict(
                "provider is still referenced by model mappings".to_string(),
            ));
        }
        let mut providers = self.providers.write().expect("providers lock");
        let before = providers.len();
        providers.retain(|p| p.id != id);
        Ok(providers.len() < before)
    }
}

#[async_trait]
impl ModelRepository for MemoryStore {
    async fn create_mapping(&self, data: NewModelMapping) -> Result<ModelMapping, GatewayError> {
        let mut mappings = self.mappings.write().expect("mappings lock");
        if mappings
            .iter()
            .any(|m| m.requested_model == data.requested_model)
        {
            return Err(GatewayError::Conflict(format!(
                "model mapping already exists: {}",
                data.requested_model
            )));
        }

        let now = Utc::now();
        let mapping = ModelMapping {
            requested_model: data.requested_model,
            strategy: data.strategy,
            matching_rules: data.matching_rules,
            capabilities: data.capabilities,
            is_active: data.is_active,
            created_at: now,
            updated_at: now,
        };
        mappings.push(mapping.clone());
        Ok(mapping)
    }

    async fn get_mapping(
        &self,
        requested_model: &str,
    ) -> Result<Option<ModelMapping>, GatewayError> {
        let mappings = self.mappings.read().expect("mappings lock");
        Ok(mappings
            .iter()
            .find(|m| m.requested_model == requested_model)
            .cloned())
    }

    async fn list_mappings(&self, active_only: bool) -> Result<Vec<ModelMapping>, GatewayError> {
        let mappings = self.mappings.read().expect("mappings lock");
        Ok(mappings
            .iter()
            .filter(|m| !active_only || m.is_active)
            .cloned()
            .collect())
    }

    async fn delete_mapping(&self, requested_model: &str) -> Result<bool, GatewayError> {
        let mut mappings = self.mappings.write().expect("mappings lock");
        let before = mappings.len();
        mappings.retain(|m| m.requested_model != requested_model);
        let deleted = mappings.len() < before;
        drop(mappings);

        if deleted {
            // Cascade to provider links
            let mut links = self.links.write().expect("links lock");
            links.retain(|l| l.requested_model != requested_model);
        }
        Ok(deleted)
    }

    async fn add_link(
        &self,
        data: NewModelMappingProvider,
    ) -> Result<ModelMappingProvider, GatewayError> {
        let now = Utc::now();
        let link = ModelMappingProvider {
            id: self.link_seq.fetch_add(1, Ordering::Relaxed),
            requested_model: data.requested_model,
            provider_id: data.provider_id,
            target_model_name: data.target_model_name,
            provider_rules: data.provider_rules,
            priority: data.priority,
            weight: data.weight.max(1),
            is_active: data.is_active,
            created_at: now,
            updated_at: now,
        };
        self.links.write().expect("links lock").push(link.clone());
        Ok(link)
    }

    async fn list_links(
        &self,
        requested_model: &str,
        active_only: bool,
    ) -> Result<Vec<ModelMappingProvider>, GatewayError> {
        let links = self.links.read().expect("links lock");
        Ok(links
            .iter()
            .filter(|l| l.requested_model == requested_model)
            .filter(|l| !active_only || l.is_active)
            .cloned()
            .collect())
    }

    async fn delete_link(&self, id: i64) -> Result<bool, GatewayError> {
        let mut links = self.links.write().expect("links lock");
        let before = links.len();
        links.retain(|l| l.id != id);
        Ok(links.len() < before)
    }

    async fn provider_has_links(&self, provider_id: i64) -> Result<bool, GatewayError> {
        let links = self.links.read().expect("links lock");
        Ok(links.iter().any(|l| l.provider_id == provider_id))
    }
}

#[async_trait]
impl ApiKeyRepository for MemoryStore {
    async fn create(&self, key_name: &str, key_value: &str) -> Result<ApiKey, GatewayError> {
        let mut api_keys = self.api_keys.write().expect("api_keys lock");
        if api_keys.iter().any(|k| k.key_name == key_name) {
            return Err(GatewayError::Conflict(format!(
                "API key name already exists: {key_name}"
            )));
        }

        let key = ApiKey {
            id: self.api_key_seq.fetch_add(1, Ordering::Relaxed),
            key_name: key_name.to_string(),
            key_value: key_value.to_string(),
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
        };
        api_keys.push(key.clone());
        Ok(key)
    }

    async fn get(&self, id: i64) -> Result<Option<ApiKey>, GatewayError> {
        let api_keys = self.api_keys.read().expect("api_keys lock");
        Ok(api_keys.iter().find(|k| k.id == id).cloned())
    }

    async fn get_by_value(&self, key_value: &str) -> Result<Option<ApiKey>, GatewayError> {
        let api_keys = self.api_keys.read().expect("api_keys lock");
        Ok(api_keys.iter().find(|k| k.key_value == key_value).cloned())
    }

    async fn list(&self) -> Result<Vec<ApiKey>, GatewayError> {
        let api_keys = self.api_keys.read().expect("api_keys lock");
        Ok(api_keys.clone())
    }

    async fn set_active(&self, id: i64, is_active: bool) -> Result<bool, GatewayError> {
        let mut api_keys = self.api_keys.write().expect("api_keys lock");
        match api_keys.iter_mut().find(|k| k.id == id) {
            Some(key) => {
                key.is_active = is_active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<(), GatewayError> {
        let mut api_keys = self.api_keys.write().expect("api_keys lock");
        if let Some(key) = api_keys.iter_mut().find(|k| k.id == id) {
            key.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool, GatewayError> {
        let mut api_keys = self.api_keys.write().expect("api_keys lock");
        let before = api_keys.len();
        api_keys.retain(|k| k.id != id);
        Ok(api_keys.len() < before)
    }
}

#[async_trait]
impl LogRepository for MemoryStore {
    async fn create(&self, data: NewRequestLog) -> Result<RequestLog, GatewayError> {
        let log = RequestLog {
            id: self.log_seq.fetch_add(1, Ordering::Relaxed),
            trace_id: data.trace_id,
            request_time: data.request_time.unwrap_or_else(Utc::now),
            api_key_id: data.api_key_id,
            api_key_name: data.api_key_name,
            requested_model: data.requested_model,
            target_model: data.target_model,
            provider_id: data.provider_id,
            provider_name: data.provider_name,
            retry_count: data.retry_count,
            matched_provider_count: data.matched_provider_count,
            first_byte_delay_ms: data.first_byte_delay_ms,
            total_time_ms: data.total_time_ms,
            input_tokens: data.input_tokens,
            output_tokens: data.output_tokens,
            request_headers: data.request_headers,
            request_body: data.request_body,
            response_status: data.response_status,
            response_body: data.response_body,
            response_headers: data.response_headers,
            error_info: data.error_info,
            is_stream: data.is_stream,
            request_protocol: data.request_protocol,
            supplier_protocol: data.supplier_protocol,
        };
        self.logs.write().expect("logs lock").push(log.clone());
        Ok(log)
    }

    async fn get(&self, id: i64) -> Result<Option<RequestLog>, GatewayError> {
        let logs = self.logs.read().expect("logs lock");
        Ok(logs.iter().find(|l| l.id == id).cloned())
    }

    async fn query(&self, query: &LogQuery) -> Result<LogPage, GatewayError> {
        let page = query.page.unwrap_or(1).max(1);
        let page_size = query.page_size.unwrap_or(20).clamp(1, 100);

        let logs = self.logs.read().expect("logs lock");
        let filtered: Vec<&RequestLog> = logs
            .iter()
            .rev() // newest first
            .filter(|log| {
                if let Some(start) = query.start_time
                    && log.request_time < start
                {
                    return false;
                }
                if let Some(end) = query.end_time
                    && log.request_time > end
                {
                    return false;
                }
                if let Some(ref model) = query.requested_model
                    && log
                        .requested_model
                        .as_deref()
                        .is_none_or(|m| !m.contains(model.as_str()))
                {
                    return false;
                }
                if let Some(provider_id) = query.provider_id
                    && log.provider_id != Some(provider_id)
                {
                    return false;
                }
                if let Some(api_key_id) = query.api_key_id
                    && log.api_key_id != Some(api_key_id)
                {
                    return false;
                }
                if let Some(min) = query.status_min
                    && log.response_status.is_none_or(|s| s < min)
                {
                    return false;
                }
                if let Some(max) = query.status_max
                    && log.response_status.is_none_or(|s| s > max)
                {
                    return false;
                }
                if let Some(has_error) = query.has_error
                    && log.error_info.is_some() != has_error
                {
                    return false;
                }
                true
            })
            .collect();

        let total = filtered.len();
        let items: Vec<RequestLog> = filtered
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect();

        Ok(LogPage {
            items,
            total,
            page,
            page_size,
        })
    }

    async fn cleanup_old_logs(&self, retention_days: u32) -> Result<u64, GatewayError> {
        let cutoff = Utc::now() - Duration::days(retention_days as i64);
        let mut logs = self.logs.write().expect("logs lock");
        let before = logs.len();
        logs.retain(|l| l.request_time >= cutoff);
        Ok((before - logs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Repositories;
    use lgw_domain::provider::{ApiType, Protocol};

    fn repos() -> Repositories {
        let encryption = Arc::new(Encryption::from_env_value(None).unwrap());
        Repositories::in_memory(encryption)
    }

    fn new_provider(name: &str) -> NewProvider {
        NewProvider::new(
            name,
            "https://api.example.com/v1",
            Protocol::OpenAi,
            ApiType::Chat,
        )
        .with_api_key("sk-upstream")
    }

    #[tokio::test]
    async fn test_provider_api_key_encrypted_at_rest() {
        let encryption = Arc::new(Encryption::from_env_value(None).unwrap());
        let store = Arc::new(MemoryStore::new(encryption));

        let created = ProviderRepository::create(&*store, new_provider("openai-main"))
            .await
            .unwrap();
        assert_eq!(created.api_key.as_deref(), Some("sk-upstream"));

        // The stored row carries ciphertext, not the plaintext
        let raw = store.providers.read().unwrap()[0].api_key.clone().unwrap();
        assert!(Encryption::is_encrypted(&raw));
        assert_ne!(raw, "sk-upstream");

        let loaded = ProviderRepository::get(&*store, created.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.api_key.as_deref(), Some("sk-upstream"));
    }

    #[tokio::test]
    async fn test_provider_update_patches_fields() {
        let repos = repos();
        let created = repos.providers.create(new_provider("patchme")).await.unwrap();

        let updated = repos
            .providers
            .update(
                created.id,
                ProviderPatch {
                    base_url: Some("https://other.example.com".to_string()),
                    api_key: Some("sk-rotated".to_string()),
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.base_url, "https://other.example.com");
        assert_eq!(updated.api_key.as_deref(), Some("sk-rotated"));
        assert!(!updated.is_active);
        assert_eq!(updated.name, "patchme");

        let by_name = repos.providers.get_by_name("patchme").await.unwrap().unwrap();
        assert_eq!(by_name.api_key.as_deref(), Some("sk-rotated"));

        assert!(
            repos
                .providers
                .update(9999, ProviderPatch::default())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_duplicate_provider_name_conflicts() {
        let repos = repos();
        repos.providers.create(new_provider("dup")).await.unwrap();
        let err = repos.providers.create(new_provider("dup")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_provider_blocked_by_links() {
        let repos = repos();
        let provider = repos.providers.create(new_provider("linked")).await.unwrap();
        repos
            .models
            .create_mapping(NewModelMapping::new("fast"))
            .await
            .unwrap();
        repos
            .models
            .add_link(NewModelMappingProvider::new("fast", provider.id, "gpt-4o"))
            .await
            .unwrap();

        let err = repos.providers.delete(provider.id).await.unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(_)));

        repos.models.delete_mapping("fast").await.unwrap();
        assert!(repos.providers.delete(provider.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_mapping_delete_cascades_links() {
        let repos = repos();
        let provider = repos.providers.create(new_provider("p")).await.unwrap();
        repos
            .models
            .create_mapping(NewModelMapping::new("fast"))
            .await
            .unwrap();
        repos
            .models
            .add_link(NewModelMappingProvider::new("fast", provider.id, "a"))
            .await
            .unwrap();
        repos
            .models
            .add_link(NewModelMappingProvider::new("fast", provider.id, "b"))
            .await
            .unwrap();

        assert_eq!(repos.models.list_links("fast", false).await.unwrap().len(), 2);
        assert!(repos.models.delete_mapping("fast").await.unwrap());
        assert!(repos.models.list_links("fast", false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_mapping_conflicts() {
        let repos = repos();
        repos
            .models
            .create_mapping(NewModelMapping::new("fast"))
            .await
            .unwrap();
        let err = repos
            .models
            .create_mapping(NewModelMapping::new("fast"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_api_key_lookup_and_last_used() {
        let repos = repos();
        let key = repos.api_keys.create("ci", "lgw-abc123").await.unwrap();

        let found = repos.api_keys.get_by_value("lgw-abc123").await.unwrap();
        assert_eq!(found.as_ref().map(|k| k.id), Some(key.id));
        assert!(found.unwrap().last_used_at.is_none());

        repos
            .api_keys
            .update_last_used(key.id, Utc::now())
            .await
            .unwrap();
        let found = repos.api_keys.get(key.id).await.unwrap().unwrap();
        assert!(found.last_used_at.is_some());

        assert!(repos.api_keys.get_by_value("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_log_query_filters_and_paging() {
        let repos = repos();
        for i in 0..25 {
            repos
                .logs
                .create(NewRequestLog {
                    trace_id: format!("trace-{i}"),
                    requested_model: Some(if i % 2 == 0 { "fast" } else { "slow" }.to_string()),
                    response_status: Some(if i % 5 == 0 { 500 } else { 200 }),
                    error_info: (i % 5 == 0).then(|| "boom".to_string()),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let page = repos
            .logs
            .query(&LogQuery {
                page: Some(2),
                page_size: Some(10),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.items.len(), 10);
        // newest first
        assert_eq!(page.items[0].trace_id, "trace-14");

        let errors = repos
            .logs
            .query(&LogQuery {
                status_min: Some(500),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(errors.total, 5);

        let fast = repos
            .logs
            .query(&LogQuery {
                requested_model: Some("fast".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(fast.total, 13);

        let with_error = repos
            .logs
            .query(&LogQuery {
                has_error: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(with_error.total, 5);
    }

    #[tokio::test]
    async fn test_log_cleanup_by_age() {
        let repos = repos();
        repos
            .logs
            .create(NewRequestLog {
                trace_id: "old".to_string(),
                request_time: Some(Utc::now() - Duration::days(30)),
                ..Default::default()
            })
            .await
            .unwrap();
        repos
            .logs
            .create(NewRequestLog {
                trace_id: "new".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let deleted = repos.logs.cleanup_old_logs(7).await.unwrap();
        assert_eq!(deleted, 1);

        let page = repos.logs.query(&LogQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].trace_id, "new");
    }
}
