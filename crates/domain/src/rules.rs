use crate::provider::Protocol;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Matching operators understood by the rule evaluator. The set is closed;
/// rules carrying anything else evaluate to false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    NotContains,
    Regex,
    In,
    NotIn,
    Exists,
}

impl Operator {
    /// Parse an operator name (case-insensitive). Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "contains" => Some(Self::Contains),
            "not_contains" => Some(Self::NotContains),
            "regex" => Some(Self::Regex),
            "in" => Some(Self::In),
            "not_in" => Some(Self::NotIn),
            "exists" => Some(Self::Exists),
            _ => None,
        }
    }
}

/// A single matching rule: field path, operator and expected value.
///
/// Rules arrive as untyped JSON blobs on mappings, so every field is
/// defaulted rather than rejected; a malformed rule simply never matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub field: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

fn default_operator() -> String {
    "eq".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuleLogic {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// A set of rules joined by AND/OR logic (AND by default).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub logic: RuleLogic,
}

impl RuleSet {
    /// Lenient conversion from a stored JSON blob. Null/missing blobs and
    /// blobs that do not look like a ruleset yield `None`.
    pub fn from_value(value: Option<&Value>) -> Option<RuleSet> {
        let value = value?;
        if value.is_null() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A provider candidate emitted by the rule engine: an active
/// (provider, target model) pair whose rules matched, carrying everything
/// the forwarding layer needs.
#[derive(Debug, Clone)]
pub struct CandidateProvider {
    pub provider_id: i64,
    pub provider_name: String,
    pub base_url: String,
    pub protocol: Protocol,
    pub api_key: Option<String>,
    pub extra_headers: Option<HashMap<String, String>>,
    pub proxy_enabled: bool,
    pub proxy_url: Option<String>,
    pub target_model: String,
    pub priority: i32,
    pub weight: u32,
}
