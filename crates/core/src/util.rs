use lgw_domain::response::ResponseBody;
use serde_json::Value;

/// Numeric arrays longer than this are truncated in logged bodies
/// (embedding inputs can carry thousands of floats).
const ARRAY_LIMIT: usize = 64;
/// Elements kept from the head of a truncated array.
const ARRAY_KEEP: usize = 8;
/// Strings longer than this are truncated in logged bodies.
const STRING_LIMIT: usize = 2048;

/// Generate a client API key: `<prefix>` + hex chars from the CSPRNG.
/// `length` counts the hex characters (rounded down to an even number).
pub fn generate_api_key(prefix: &str, length: usize) -> String {
    let bytes: Vec<u8> = (0..length / 2).map(|_| rand::random::<u8>()).collect();
    let mut key = String::with_capacity(prefix.len() + bytes.len() * 2);
    key.push_str(prefix);
    for byte in bytes {
        key.push_str(&format!("{byte:02x}"));
    }
    key
}

/// Mint a request trace ID (UUIDv4).
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Parse text as JSON when it looks like an object or array; otherwise
/// return it as a JSON string value.
pub fn try_parse_json(text: &str) -> Value {
    let trimmed = text.trim();
    let looks_like_json = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if looks_like_json
        && let Ok(value) = serde_json::from_str(trimmed)
    {
        return value;
    }
    Value::String(text.to_string())
}

/// Trim oversized values out of a JSON body before logging it: long numeric
/// arrays keep a head plus an item-count marker, long strings keep a head
/// plus a char-count marker, and containers are walked recursively.
pub fn truncate_json(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            if s.chars().count() > STRING_LIMIT {
                let head: String = s.chars().take(STRING_LIMIT).collect();
                Value::String(format!("{head}...({} chars)...", s.chars().count()))
            } else {
                value.clone()
            }
        }
        Value::Array(items) => {
            if items.len() > ARRAY_LIMIT {
                let mut kept: Vec<Value> =
                    items.iter().take(ARRAY_KEEP).map(truncate_json).collect();
                kept.push(Value::String(format!("...({} items)...", items.len())));
                Value::Array(kept)
            } else {
                Value::Array(items.iter().map(truncate_json).collect())
            }
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), truncate_json(v)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// Render an upstream response body for the request log: the parsed JSON, a
/// best-effort decoded string, or a binary marker.
pub fn response_body_for_log(body: &ResponseBody) -> Option<Value> {
    match body {
        ResponseBody::Json(value) => Some(truncate_json(value)),
        ResponseBody::Raw(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Some(truncate_json(&try_parse_json(text))),
            Err(_) => Some(Value::String(format!("[binary data: {} bytes]", bytes.len()))),
        },
        ResponseBody::Empty => None,
    }
}
