use crate::rules::RuleSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maps a client-facing model name onto one or more provider entries.
/// At most one mapping exists per `requested_model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMapping {
    pub requested_model: String,
    /// Selection strategy; only `round_robin` is supported.
    pub strategy: String,
    pub matching_rules: Option<RuleSet>,
    pub capabilities: Option<Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A (requested model, provider) link with the model name to substitute
/// upstream. Duplicate (requested_model, provider_id) pairs are allowed and
/// act as parallel candidate entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMappingProvider {
    pub id: i64,
    pub requested_model: String,
    pub provider_id: i64,
    pub target_model_name: String,
    pub provider_rules: Option<RuleSet>,
    /// Smaller value wins.
    pub priority: i32,
    pub weight: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a model mapping.
#[derive(Debug, Clone)]
pub struct NewModelMapping {
    pub requested_model: String,
    pub strategy: String,
    pub matching_rules: Option<RuleSet>,
    pub capabilities: Option<Value>,
    pub is_active: bool,
}

impl NewModelMapping {
    pub fn new(requested_model: &str) -> Self {
        Self {
            requested_model: requested_model.to_string(),
            strategy: "round_robin".to_string(),
            matching_rules: None,
            capabilities: None,
            is_active: true,
        }
    }
}

/// Fields for creating a model-provider link.
#[derive(Debug, Clone)]
pub struct NewModelMappingProvider {
    pub requested_model: String,
    pub provider_id: i64,
    pub target_model_name: String,
    pub provider_rules: Option<RuleSet>,
    pub priority: i32,
    pub weight: u32,
    pub is_active: bool,
}

impl NewModelMappingProvider {
    pub fn new(requested_model: &str, provider_id: i64, target_model_name: &str) -> Self {
        Self {
            requested_model: requested_model.to_string(),
            provider_id,
            target_model_name: target_model_name.to_string(),
            provider_rules: None,
            priority: 0,
            weight: 1,
            is_active: true,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
