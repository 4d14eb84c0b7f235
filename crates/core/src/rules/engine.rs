use crate::rules::evaluator::evaluate_ruleset;
use lgw_domain::context::RuleContext;
use lgw_domain::mapping::{ModelMapping, ModelMappingProvider};
use lgw_domain::provider::Provider;
use lgw_domain::rules::CandidateProvider;
use std::collections::HashMap;

/// Evaluates the model-level rule set and each provider link's rule set
/// against a request context, emitting the ordered candidate list.
pub struct RuleEngine;

impl RuleEngine {
    /// Produce the candidates for one request.
    ///
    /// 1. A failing model-level rule set short-circuits to an empty list.
    /// 2. Links are filtered: inactive links, missing providers and inactive
    ///    providers are skipped; the link's rule set must pass.
    /// 3. Candidates are sorted by (priority, provider_id).
    pub fn evaluate(
        ctx: &RuleContext,
        mapping: &ModelMapping,
        links: &[ModelMappingProvider],
        providers: &HashMap<i64, Provider>,
    ) -> Vec<CandidateProvider> {
        let mut candidates: Vec<CandidateProvider> = Vec::new();

        if !evaluate_ruleset(mapping.matching_rules.as_ref(), ctx) {
            return candidates;
        }

        for link in links {
            if !link.is_active {
                continue;
            }
            let Some(provider) = providers.get(&link.provider_id) else {
                continue;
            };
            if !provider.is_active {
                continue;
            }
            if !evaluate_ruleset(link.provider_rules.as_ref(), ctx) {
                continue;
            }

            candidates.push(CandidateProvider {
                provider_id: provider.id,
                provider_name: provider.name.clone(),
                base_url: provider.base_url.clone(),
                protocol: provider.protocol,
                api_key: provider.api_key.clone(),
                extra_headers: provider.extra_headers.clone(),
                proxy_enabled: provider.proxy_enabled,
                proxy_url: provider.proxy_url.clone(),
                target_model: link.target_model_name.clone(),
                priority: link.priority,
                weight: link.weight,
            });
        }

        candidates.sort_by_key(|c| (c.priority, c.provider_id));
        candidates
    }
}
