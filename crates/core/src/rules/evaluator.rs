use lgw_domain::context::RuleContext;
use lgw_domain::rules::{Operator, Rule, RuleLogic, RuleSet};
use serde_json::Value;
use std::cmp::Ordering;

/// Evaluate a single rule against the request context.
///
/// Unknown operators, unresolvable fields and type mismatches all evaluate
/// to false rather than erroring; rules are untrusted configuration data.
pub fn evaluate_rule(rule: &Rule, ctx: &RuleContext) -> bool {
    let Some(operator) = Operator::parse(&rule.operator) else {
        return false;
    };

    let actual = ctx.lookup(&rule.field).unwrap_or(Value::Null);
    let expected = &rule.value;

    match operator {
        Operator::Eq => value_eq(&actual, expected),
        Operator::Ne => !value_eq(&actual, expected),
        Operator::Gt => compare(&actual, expected).is_some_and(|o| o == Ordering::Greater),
        Operator::Gte => compare(&actual, expected).is_some_and(|o| o != Ordering::Less),
        Operator::Lt => compare(&actual, expected).is_some_and(|o| o == Ordering::Less),
        Operator::Lte => compare(&actual, expected).is_some_and(|o| o != Ordering::Greater),
        Operator::Contains => contains(&actual, expected),
        Operator::NotContains => match actual.as_str() {
            Some(_) => !contains(&actual, expected),
            None => true,
        },
        Operator::Regex => regex_match(&actual, expected),
        Operator::In => match expected.as_array() {
            Some(list) => list.iter().any(|item| value_eq(&actual, item)),
            None => false,
        },
        Operator::NotIn => match expected.as_array() {
            Some(list) => !list.iter().any(|item| value_eq(&actual, item)),
            None => true,
        },
        Operator::Exists => {
            let exists = !actual.is_null();
            let want_exists = !matches!(expected, Value::Bool(false) | Value::Null);
            exists == want_exists
        }
    }
}

/// Evaluate a rule set. Absent/empty rule sets pass; AND requires all rules,
/// OR requires any.
pub fn evaluate_ruleset(ruleset: Option<&RuleSet>, ctx: &RuleContext) -> bool {
    let Some(ruleset) = ruleset else {
        return true;
    };
    if ruleset.is_empty() {
        return true;
    }

    match ruleset.logic {
        RuleLogic::And => ruleset.rules.iter().all(|rule| evaluate_rule(rule, ctx)),
        RuleLogic::Or => ruleset.rules.iter().any(|rule| evaluate_rule(rule, ctx)),
    }
}

/// Equality with numeric normalization (1 == 1.0).
fn value_eq(a: &Value, b: &Value) -> bool {
    if a.is_number() && b.is_number() {
        return a.as_f64() == b.as_f64();
    }
    a == b
}

/// Ordered comparison. Only numbers compare with numbers and strings with
/// strings; anything else (including null) is incomparable.
fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    if actual.is_number() && expected.is_number() {
        return actual.as_f64()?.partial_cmp(&expected.as_f64()?);
    }
    if let (Some(a), Some(b)) = (actual.as_str(), expected.as_str()) {
        return Some(a.cmp(b));
    }
    None
}

fn expected_as_string(expected: &Value) -> String {
    match expected.as_str() {
        Some(s) => s.to_string(),
        None => expected.to_string(),
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual.as_str() {
        Some(haystack) => haystack.contains(&expected_as_string(expected)),
        None => false,
    }
}

fn regex_match(actual: &Value, expected: &Value) -> bool {
    let Some(haystack) = actual.as_str() else {
        return false;
    };
    match regex::Regex::new(&expected_as_string(expected)) {
        Ok(pattern) => pattern.is_match(haystack),
        Err(_) => false,
    }
}
