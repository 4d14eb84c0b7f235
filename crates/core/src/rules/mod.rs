pub mod engine;
pub mod evaluator;

pub use engine::RuleEngine;
pub use evaluator::{evaluate_rule, evaluate_ruleset};
