pub mod api_key;
pub mod context;
pub mod log;
pub mod mapping;
pub mod provider;
pub mod response;
pub mod rules;

pub use api_key::ApiKey;
pub use context::{RuleContext, TokenUsage};
pub use log::{LogPage, LogQuery, NewRequestLog, RequestLog};
pub use mapping::{ModelMapping, ModelMappingProvider};
pub use provider::{ApiType, Protocol, Provider};
pub use response::{ProviderResponse, ResponseBody, ResponseMode};
pub use rules::{CandidateProvider, Operator, Rule, RuleLogic, RuleSet};
