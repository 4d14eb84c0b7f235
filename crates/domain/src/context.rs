use serde_json::Value;
use std::collections::HashMap;

/// Token consumption attached to a request context. Output tokens are
/// normally still zero at rule-evaluation time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Per-request context the rule engine evaluates against.
#[derive(Debug, Clone, Default)]
pub struct RuleContext {
    /// The model name the client requested.
    pub current_model: String,
    /// Request headers with lowercased names.
    pub headers: HashMap<String, String>,
    /// Parsed JSON request body.
    pub request_body: Value,
    pub token_usage: TokenUsage,
}

impl RuleContext {
    /// Resolve a dotted field path against this context.
    ///
    /// Supported roots:
    /// - `model` -> the requested model name
    /// - `headers.<name>` -> header value
    /// - `body.<path>` -> request body, with `name[idx]` list indexing
    /// - `token_usage.{input,output,total}_tokens`
    pub fn lookup(&self, field_path: &str) -> Option<Value> {
        if field_path.is_empty() {
            return None;
        }

        let mut parts = field_path.split('.');
        let root = parts.next()?.to_ascii_lowercase();
        let rest: Vec<&str> = parts.collect();

        match root.as_str() {
            "model" => Some(Value::String(self.current_model.clone())),
            "headers" => {
                let key = rest.join(".");
                self.headers.get(&key).map(|v| Value::String(v.clone()))
            }
            "body" => lookup_nested(&self.request_body, &rest),
            "token_usage" => match rest.first().copied() {
                Some("input_tokens") => Some(Value::from(self.token_usage.input_tokens)),
                Some("output_tokens") => Some(Value::from(self.token_usage.output_tokens)),
                Some("total_tokens") => Some(Value::from(self.token_usage.total_tokens())),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Walk a path through nested JSON, supporting `key[index]` segments.
fn lookup_nested(obj: &Value, path: &[&str]) -> Option<Value> {
    if path.is_empty() {
        return Some(obj.clone());
    }

    let current = path[0];
    let rest = &path[1..];

    if let Some(open) = current.find('[')
        && current.ends_with(']')
    {
        let key = &current[..open];
        let index: usize = current[open + 1..current.len() - 1].parse().ok()?;
        let arr = obj.get(key)?.as_array()?;
        return lookup_nested(arr.get(index)?, rest);
    }

    lookup_nested(obj.get(current)?, rest)
}
