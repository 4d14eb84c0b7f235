use lgw_domain::Protocol;
use serde_json::Value;
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

/// Framing overhead per chat message: <|start|>role<|separator|>content<|end|>
const TOKENS_PER_MESSAGE: u64 = 4;
/// Every reply is primed with <|start|>assistant<|message|>
const TOKENS_PER_REPLY: u64 = 3;

/// Approximate cost of an image part at detail:low (the published baseline).
const IMAGE_TOKENS_LOW: u64 = 85;
/// Approximate cost of a high/auto-detail image: baseline plus four tiles.
const IMAGE_TOKENS_HIGH: u64 = 85 + 4 * 170;

/// Token counting for a protocol dialect.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in a plain text string.
    fn count_tokens(&self, text: &str, model: &str) -> u64;

    /// Count tokens in a chat message list, including framing overhead.
    fn count_messages(&self, messages: &[Value], model: &str) -> u64;
}

/// Ceiling character estimate used when no tokenizer is available
/// (roughly 4 characters per token).
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();
static O200K: OnceLock<Option<CoreBPE>> = OnceLock::new();
static P50K: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn cl100k() -> Option<&'static CoreBPE> {
    CL100K
        .get_or_init(|| tiktoken_rs::cl100k_base().ok())
        .as_ref()
}

fn o200k() -> Option<&'static CoreBPE> {
    O200K.get_or_init(|| tiktoken_rs::o200k_base().ok()).as_ref()
}

fn p50k() -> Option<&'static CoreBPE> {
    P50K.get_or_init(|| tiktoken_rs::p50k_base().ok()).as_ref()
}

/// Pick the encoding for a model. cl100k_base is the default; o200k-class
/// and davinci-class models get their own table entries.
fn bpe_for_model(model: &str) -> Option<&'static CoreBPE> {
    const O200K_PREFIXES: [&str; 4] = ["gpt-4o", "gpt-4.1", "o1", "o3"];
    const P50K_PREFIXES: [&str; 3] = ["text-davinci", "code-davinci", "davinci"];
    if O200K_PREFIXES.iter().any(|p| model.starts_with(p)) {
        o200k()
    } else if P50K_PREFIXES.iter().any(|p| model.starts_with(p)) {
        p50k()
    } else {
        cl100k()
    }
}

fn image_part_tokens(part: &Value) -> u64 {
    let detail = part
        .get("image_url")
        .and_then(|u| u.get("detail"))
        .and_then(|d| d.as_str());
    match detail {
        Some("low") => IMAGE_TOKENS_LOW,
        _ => IMAGE_TOKENS_HIGH,
    }
}

/// Count tokens contributed by a structured content array (multimodal).
fn count_content_parts(counter: &dyn TokenCounter, parts: &[Value], model: &str) -> u64 {
    let mut total = 0;
    for part in parts {
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            total += counter.count_tokens(text, model);
        }
        match part.get("type").and_then(|t| t.as_str()) {
            Some("image_url") | Some("image") => total += image_part_tokens(part),
            _ => {}
        }
    }
    total
}

// ─── OpenAI ────────────────────────────────────────────────────────────────

/// OpenAI-style counter backed by tiktoken, with a character estimate as
/// fallback when the encoding cannot be loaded.
pub struct OpenAiTokenCounter;

impl TokenCounter for OpenAiTokenCounter {
    fn count_tokens(&self, text: &str, model: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        match bpe_for_model(model) {
            Some(bpe) => bpe.encode_ordinary(text).len() as u64,
            None => estimate_tokens(text),
        }
    }

    fn count_messages(&self, messages: &[Value], model: &str) -> u64 {
        if messages.is_empty() {
            return 0;
        }

        let mut total = 0u64;
        for message in messages {
            let Some(obj) = message.as_object() else {
                continue;
            };
            total += TOKENS_PER_MESSAGE;
            for (key, value) in obj {
                match (key.as_str(), value) {
                    ("name", Value::String(s)) => {
                        total += self.count_tokens(s, model);
                        total = total.saturating_sub(1);
                    }
                    ("tool_calls", v) | ("function_call", v) if !v.is_null() => {
                        if let Ok(serialized) = serde_json::to_string(v) {
                            total += self.count_tokens(&serialized, model);
                        }
                    }
                    (_, Value::String(s)) => total += self.count_tokens(s, model),
                    (_, Value::Array(parts)) => total += count_content_parts(self, parts, model),
                    _ => {}
                }
            }
        }

        total + TOKENS_PER_REPLY
    }
}

// ─── Anthropic ─────────────────────────────────────────────────────────────

/// Anthropic-style counter. Estimation only (roughly 4 characters per
/// token) with the Messages framing overhead.
pub struct AnthropicTokenCounter;

impl TokenCounter for AnthropicTokenCounter {
    fn count_tokens(&self, text: &str, _model: &str) -> u64 {
        (text.chars().count() / 4) as u64
    }

    fn count_messages(&self, messages: &[Value], model: &str) -> u64 {
        if messages.is_empty() {
            return 0;
        }

        let mut total = 0u64;
        for message in messages {
            let Some(obj) = message.as_object() else {
                continue;
            };

            if let Some(role) = obj.get("role").and_then(|r| r.as_str()) {
                total += self.count_tokens(role, model);
            }

            match obj.get("content") {
                Some(Value::String(s)) => total += self.count_tokens(s, model),
                Some(Value::Array(parts)) => total += count_content_parts(self, parts, model),
                _ => {}
            }

            if let Some(tool_calls) = obj.get("tool_calls")
                && !tool_calls.is_null()
                && let Ok(serialized) = serde_json::to_string(tool_calls)
            {
                total += self.count_tokens(&serialized, model);
            }

            total += TOKENS_PER_MESSAGE;
        }

        total
    }
}

// ─── Selection & request counting ──────────────────────────────────────────

/// Get the counter for a protocol dialect.
pub fn counter_for(protocol: Protocol) -> &'static dyn TokenCounter {
    static OPENAI: OpenAiTokenCounter = OpenAiTokenCounter;
    static ANTHROPIC: AnthropicTokenCounter = AnthropicTokenCounter;
    match protocol {
        Protocol::OpenAi => &OPENAI,
        Protocol::Anthropic => &ANTHROPIC,
    }
}

fn count_string_or_list(counter: &dyn TokenCounter, value: &Value, model: &str) -> u64 {
    match value {
        Value::String(s) => counter.count_tokens(s, model),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => counter.count_tokens(s, model),
                other => other
                    .get("text")
                    .and_then(|t| t.as_str())
                    .map(|t| counter.count_tokens(t, model))
                    .unwrap_or(0),
            })
            .sum(),
        _ => 0,
    }
}

/// Estimate the input token count of an ingress request body. Handles chat
/// `messages` (plus Anthropic `system`), text-completion `prompt` and
/// embedding `input` shapes.
pub fn count_request(protocol: Protocol, body: &Value) -> u64 {
    let model = body.get("model").and_then(|m| m.as_str()).unwrap_or("");
    let counter = counter_for(protocol);

    if let Some(messages) = body.get("messages").and_then(|m| m.as_array()) {
        let mut total = counter.count_messages(messages, model);
        if let Some(system) = body.get("system") {
            total += count_string_or_list(counter, system, model);
        }
        return total;
    }

    if let Some(prompt) = body.get("prompt") {
        return count_string_or_list(counter, prompt, model);
    }

    if let Some(input) = body.get("input") {
        return count_string_or_list(counter, input, model);
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_estimate_is_ceiling() {
        assert_eq!(estimate_tokens("Hello world"), 3); // ceil(11 / 4)
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_anthropic_estimate_is_floor() {
        let counter = AnthropicTokenCounter;
        assert_eq!(counter.count_tokens("Hello world", ""), 2); // 11 / 4
        assert_eq!(counter.count_tokens("", ""), 0);
    }

    #[test]
    fn test_openai_empty_text() {
        assert_eq!(OpenAiTokenCounter.count_tokens("", "gpt-4"), 0);
    }

    #[test]
    fn test_openai_counts_words() {
        let n = OpenAiTokenCounter.count_tokens("Hello world", "gpt-4");
        assert!(n >= 2 && n <= 4, "unexpected token count {n}");
    }

    #[test]
    fn test_davinci_models_use_p50k() {
        let text = "The quick brown fox jumps over the lazy dog";
        for model in ["text-davinci-003", "text-davinci-002", "code-davinci-002"] {
            let expected = p50k().unwrap().encode_ordinary(text).len() as u64;
            assert_eq!(OpenAiTokenCounter.count_tokens(text, model), expected);
        }
        // and chat-era models stay on cl100k
        let expected = cl100k().unwrap().encode_ordinary(text).len() as u64;
        assert_eq!(OpenAiTokenCounter.count_tokens(text, "gpt-4"), expected);
    }

    #[test]
    fn test_openai_message_overhead() {
        let counter = OpenAiTokenCounter;
        assert_eq!(counter.count_messages(&[], "gpt-4"), 0);

        let messages = vec![json!({"role": "user", "content": "hi"})];
        let n = counter.count_messages(&messages, "gpt-4");
        let content = counter.count_tokens("user", "gpt-4") + counter.count_tokens("hi", "gpt-4");
        assert_eq!(n, content + TOKENS_PER_MESSAGE + TOKENS_PER_REPLY);
    }

    #[test]
    fn test_name_field_discount() {
        let counter = OpenAiTokenCounter;
        let without = vec![json!({"role": "user", "content": "hi"})];
        let with = vec![json!({"role": "user", "content": "hi", "name": "bob"})];
        let name_tokens = counter.count_tokens("bob", "gpt-4");
        assert_eq!(
            counter.count_messages(&with, "gpt-4"),
            counter.count_messages(&without, "gpt-4") + name_tokens - 1
        );
    }

    #[test]
    fn test_multimodal_image_parts() {
        let counter = OpenAiTokenCounter;
        let low = vec![json!({"role": "user", "content": [
            {"type": "image_url", "image_url": {"url": "http://x/a.png", "detail": "low"}},
        ]})];
        let high = vec![json!({"role": "user", "content": [
            {"type": "image_url", "image_url": {"url": "http://x/a.png", "detail": "high"}},
        ]})];
        let low_n = counter.count_messages(&low, "gpt-4");
        let high_n = counter.count_messages(&high, "gpt-4");
        assert_eq!(low_n, IMAGE_TOKENS_LOW + TOKENS_PER_MESSAGE + TOKENS_PER_REPLY);
        assert_eq!(high_n, IMAGE_TOKENS_HIGH + TOKENS_PER_MESSAGE + TOKENS_PER_REPLY);
    }

    #[test]
    fn test_tool_calls_contribute() {
        let counter = OpenAiTokenCounter;
        let plain = vec![json!({"role": "assistant", "content": ""})];
        let with_tools = vec![json!({"role": "assistant", "content": "", "tool_calls": [
            {"id": "call_1", "type": "function",
             "function": {"name": "get_weather", "arguments": "{\"city\":\"Berlin\"}"}},
        ]})];
        assert!(
            counter.count_messages(&with_tools, "gpt-4") > counter.count_messages(&plain, "gpt-4")
        );
    }

    #[test]
    fn test_count_request_shapes() {
        let chat = json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hello"}]});
        assert!(count_request(Protocol::OpenAi, &chat) > 0);

        let completion = json!({"model": "gpt-3.5-turbo-instruct", "prompt": "tell me a story"});
        assert!(count_request(Protocol::OpenAi, &completion) > 0);

        let embedding = json!({"model": "text-embedding-ada-002", "input": ["one", "two"]});
        assert!(count_request(Protocol::OpenAi, &embedding) > 0);

        let anthropic = json!({
            "model": "claude-3-5-sonnet",
            "system": "be concise",
            "messages": [{"role": "user", "content": "hello there friend"}],
        });
        assert!(count_request(Protocol::Anthropic, &anthropic) > 0);

        assert_eq!(count_request(Protocol::OpenAi, &json!({"model": "x"})), 0);
    }
}
