use crate::sse::SseParser;
use lgw_core::tokens::{TokenCounter, counter_for};
use lgw_domain::provider::Protocol;
use lgw_domain::response::ResponseBody;
use serde_json::{Value, json};
use std::collections::BTreeMap;

const DEFAULT_PREVIEW_CHARS: usize = 4096;

/// Final token/text accounting for one streamed response.
#[derive(Debug)]
pub struct StreamUsageResult {
    pub output_text: String,
    pub output_preview: String,
    pub output_preview_truncated: bool,
    pub output_tokens: u64,
    pub upstream_reported_output_tokens: Option<u64>,
}

/// Accumulates one streamed tool call: argument deltas are concatenated,
/// id and name stick from the chunk that carried them.
#[derive(Debug, Default)]
struct ToolCallParts {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolCallParts {
    fn absorb(&mut self, call: &Value) {
        if let Some(id) = call.get("id").and_then(|v| v.as_str()) {
            self.id = Some(id.to_string());
        }
        let function = call.get("function").unwrap_or(call);
        if let Some(name) = function.get("name").and_then(|v| v.as_str()) {
            self.name = Some(name.to_string());
        }
        if let Some(arguments) = function.get("arguments").and_then(|v| v.as_str()) {
            self.arguments.push_str(arguments);
        }
    }
}

/// Reconstructs output text and token counts from a pass-through SSE stream.
///
/// The upstream-reported usage wins when present and positive; otherwise the
/// aggregated text (including the serialized tool calls) is counted with the
/// protocol's tokenizer.
pub struct StreamUsageAccumulator {
    model: String,
    preview_chars: usize,
    parser: SseParser,
    counter: &'static dyn TokenCounter,
    handle_anthropic: bool,
    text: String,
    tool_calls: BTreeMap<u64, ToolCallParts>,
    function_call: Option<ToolCallParts>,
    upstream_output_tokens: Option<u64>,
}

impl StreamUsageAccumulator {
    pub fn new(protocol: Protocol, model: &str) -> Self {
        Self::with_preview_chars(protocol, model, DEFAULT_PREVIEW_CHARS)
    }

    pub fn with_preview_chars(protocol: Protocol, model: &str, preview_chars: usize) -> Self {
        Self {
            model: model.to_string(),
            preview_chars,
            parser: SseParser::new(),
            counter: counter_for(protocol),
            handle_anthropic: protocol == Protocol::Anthropic,
            text: String::new(),
            tool_calls: BTreeMap::new(),
            function_call: None,
            upstream_output_tokens: None,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        for payload in self.parser.feed(chunk) {
            self.handle_payload(&payload);
        }
    }

    pub fn finalize(mut self) -> StreamUsageResult {
        if !self.tool_calls.is_empty() {
            let calls: Vec<Value> = self
                .tool_calls
                .values()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {"name": call.name, "arguments": call.arguments},
                    })
                })
                .collect();
            if let Ok(serialized) = serde_json::to_string(&calls) {
                self.text.push_str(&serialized);
            }
        }
        if let Some(call) = &self.function_call {
            let legacy = json!({"name": call.name, "arguments": call.arguments});
            if let Ok(serialized) = serde_json::to_string(&legacy) {
                self.text.push_str(&serialized);
            }
        }

        let output_tokens = match self.upstream_output_tokens {
            Some(reported) if reported > 0 => reported,
            _ => self.counter.count_tokens(&self.text, &self.model),
        };

        let char_count = self.text.chars().count();
        let (output_preview, truncated) = if char_count > self.preview_chars {
            (
                self.text.chars().take(self.preview_chars).collect(),
                true,
            )
        } else {
            (self.text.clone(), false)
        };

        StreamUsageResult {
            output_text: self.text,
            output_preview,
            output_preview_truncated: truncated,
            output_tokens,
            upstream_reported_output_tokens: self.upstream_output_tokens,
        }
    }

    fn handle_payload(&mut self, payload: &str) {
        let trimmed = payload.trim();
        if trimmed.is_empty() || trimmed == "[DONE]" {
            return;
        }
        let Ok(data) = serde_json::from_str::<Value>(payload) else {
            return;
        };

        if self.handle_anthropic {
            self.handle_anthropic_event(&data);
        } else {
            self.handle_openai_event(&data);
        }
    }

    fn adopt_usage(&mut self, usage: &Value) {
        if let Some(tokens) = usage.get("completion_tokens").and_then(|v| v.as_u64()) {
            self.upstream_output_tokens = Some(tokens);
        }
        if let Some(tokens) = usage.get("output_tokens").and_then(|v| v.as_u64()) {
            self.upstream_output_tokens = Some(tokens);
        }
    }

    fn handle_openai_event(&mut self, data: &Value) {
        if let Some(usage) = data.get("usage")
            && usage.is_object()
        {
            self.adopt_usage(usage);
        }

        let Some(choices) = data.get("choices").and_then(|c| c.as_array()) else {
            return;
        };

        for choice in choices {
            if let Some(delta) = choice.get("delta").and_then(|d| d.as_object()) {
                if let Some(content) = delta.get("content").and_then(|c| c.as_str()) {
                    self.text.push_str(content);
                }
                if let Some(tool_calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
                    for call in tool_calls {
                        let index = call.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                        self.tool_calls.entry(index).or_default().absorb(call);
                    }
                }
                if let Some(function_call) = delta.get("function_call")
                    && function_call.is_object()
                {
                    self.function_call
                        .get_or_insert_with(ToolCallParts::default)
                        .absorb(function_call);
                }
                continue;
            }

            // Text-completions stream: choices[].text
            if let Some(text) = choice.get("text").and_then(|t| t.as_str()) {
                self.text.push_str(text);
            }
        }
    }

    fn handle_anthropic_event(&mut self, data: &Value) {
        // usage may sit at the event root, under message (message_start) or
        // under delta (message_delta)
        let usage = [data, &data["message"], &data["delta"]]
            .into_iter()
            .find_map(|v| v.get("usage").filter(|u| u.is_object()).cloned());
        if let Some(usage) = usage {
            self.adopt_usage(&usage);
        }

        if data.get("type").and_then(|t| t.as_str()) == Some("content_block_delta") {
            if let Some(text) = data
                .get("delta")
                .and_then(|d| d.get("text"))
                .and_then(|t| t.as_str())
            {
                self.text.push_str(text);
            }
            return;
        }

        // Legacy text-completions event shape
        if let Some(completion) = data.get("completion").and_then(|c| c.as_str()) {
            self.text.push_str(completion);
        }
    }
}

// ─── Non-stream usage extraction ───────────────────────────────────────────

fn coerce_json(body: &ResponseBody) -> Option<Value> {
    match body {
        ResponseBody::Json(value) => Some(value.clone()),
        ResponseBody::Raw(bytes) => {
            let text = std::str::from_utf8(bytes).ok()?;
            let trimmed = text.trim_start();
            if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
                return None;
            }
            serde_json::from_str(trimmed).ok()
        }
        ResponseBody::Empty => None,
    }
}

fn usage_object(value: &Value) -> Option<Value> {
    if let Some(usage) = value.get("usage").filter(|u| u.is_object()) {
        return Some(usage.clone());
    }
    // Some protocols nest usage one level down.
    for key in ["message", "delta", "response"] {
        if let Some(usage) = value
            .get(key)
            .and_then(|nested| nested.get("usage"))
            .filter(|u| u.is_object())
        {
            return Some(usage.clone());
        }
    }
    None
}

/// Best-effort output token count from a non-streaming response body:
/// `usage.completion_tokens`, `usage.output_tokens`, or
/// `usage.total_tokens - usage.prompt_tokens`.
pub fn extract_output_tokens(body: &ResponseBody) -> Option<u64> {
    let value = coerce_json(body)?;
    let usage = usage_object(&value)?;

    if let Some(tokens) = usage.get("completion_tokens").and_then(|v| v.as_u64()) {
        return Some(tokens);
    }
    if let Some(tokens) = usage.get("output_tokens").and_then(|v| v.as_u64()) {
        return Some(tokens);
    }

    let total = usage.get("total_tokens").and_then(|v| v.as_u64());
    let prompt = usage.get("prompt_tokens").and_then(|v| v.as_u64());
    if let (Some(total), Some(prompt)) = (total, prompt)
        && total >= prompt
    {
        return Some(total - prompt);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn sse(payload: &str) -> Vec<u8> {
        format!("data: {payload}\n\n").into_bytes()
    }

    #[test]
    fn test_openai_delta_text_accumulates() {
        let mut acc = StreamUsageAccumulator::new(Protocol::OpenAi, "gpt-4");
        acc.feed(&sse(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#));
        acc.feed(&sse(r#"{"choices":[{"delta":{"content":"lo"}}]}"#));
        acc.feed(&sse(r#"{"choices":[{"delta":{"content":" world"}}]}"#));
        acc.feed(b"data: [DONE]\n\n");

        let result = acc.finalize();
        assert_eq!(result.output_text, "Hello world");
        assert_eq!(result.upstream_reported_output_tokens, None);
        // No upstream usage: counted from text
        let expected = counter_for(Protocol::OpenAi).count_tokens("Hello world", "gpt-4");
        assert_eq!(result.output_tokens, expected);
    }

    #[test]
    fn test_upstream_usage_wins_when_positive() {
        let mut acc = StreamUsageAccumulator::new(Protocol::OpenAi, "gpt-4");
        acc.feed(&sse(r#"{"choices":[{"delta":{"content":"a long stretch of text"}}]}"#));
        acc.feed(&sse(r#"{"choices":[],"usage":{"completion_tokens":42}}"#));

        let result = acc.finalize();
        assert_eq!(result.output_tokens, 42);
        assert_eq!(result.upstream_reported_output_tokens, Some(42));
    }

    #[test]
    fn test_zero_usage_falls_back_to_counting() {
        let mut acc = StreamUsageAccumulator::new(Protocol::OpenAi, "gpt-4");
        acc.feed(&sse(r#"{"choices":[{"delta":{"content":"Hello world"}}]}"#));
        acc.feed(&sse(r#"{"choices":[],"usage":{"completion_tokens":0}}"#));

        let result = acc.finalize();
        let expected = counter_for(Protocol::OpenAi).count_tokens("Hello world", "gpt-4");
        assert_eq!(result.output_tokens, expected);
        assert_eq!(result.upstream_reported_output_tokens, Some(0));
    }

    #[test]
    fn test_output_tokens_field_also_adopted() {
        let mut acc = StreamUsageAccumulator::new(Protocol::OpenAi, "gpt-4");
        acc.feed(&sse(r#"{"choices":[],"usage":{"output_tokens":7}}"#));
        assert_eq!(acc.finalize().output_tokens, 7);
    }

    #[test]
    fn test_tool_call_deltas_accumulate_per_index() {
        let mut acc = StreamUsageAccumulator::new(Protocol::OpenAi, "gpt-4");
        acc.feed(&sse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"get_weather","arguments":"{\"ci"}}]}}]}"#,
        ));
        acc.feed(&sse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ty\":\"Berlin\"}"}}]}}]}"#,
        ));
        acc.feed(&sse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"get_time","arguments":"{}"}}]}}]}"#,
        ));

        let result = acc.finalize();
        let calls: Value = serde_json::from_str(&result.output_text).unwrap();
        assert_eq!(calls.as_array().unwrap().len(), 2);
        assert_eq!(calls[0]["id"], "call_a");
        assert_eq!(calls[0]["function"]["name"], "get_weather");
        assert_eq!(calls[0]["function"]["arguments"], "{\"city\":\"Berlin\"}");
        assert_eq!(calls[1]["function"]["name"], "get_time");
        assert!(result.output_tokens > 0);
    }

    #[test]
    fn test_legacy_function_call_deltas() {
        let mut acc = StreamUsageAccumulator::new(Protocol::OpenAi, "gpt-4");
        acc.feed(&sse(r#"{"choices":[{"delta":{"function_call":{"name":"lookup","arguments":"{\"q\":"}}]}"#));
        acc.feed(&sse(r#"{"choices":[{"delta":{"function_call":{"arguments":"\"x\"}"}}]}"#));

        let result = acc.finalize();
        assert!(result.output_text.contains("lookup"));
        assert!(result.output_text.contains("{\"q\":\"x\"}"));
    }

    #[test]
    fn test_text_completion_chunks() {
        let mut acc = StreamUsageAccumulator::new(Protocol::OpenAi, "gpt-3.5-turbo-instruct");
        acc.feed(&sse(r#"{"choices":[{"text":"once upon"}]}"#));
        acc.feed(&sse(r#"{"choices":[{"text":" a time"}]}"#));
        assert_eq!(acc.finalize().output_text, "once upon a time");
    }

    #[test]
    fn test_anthropic_content_block_delta() {
        let mut acc = StreamUsageAccumulator::new(Protocol::Anthropic, "claude-3-5-sonnet");
        acc.feed(&sse(
            r#"{"type":"message_start","message":{"usage":{"input_tokens":10,"output_tokens":1}}}"#,
        ));
        acc.feed(&sse(r#"{"type":"content_block_delta","delta":{"text":"Hello"}}"#));
        acc.feed(&sse(r#"{"type":"content_block_delta","delta":{"text":" there"}}"#));
        acc.feed(&sse(
            r#"{"type":"message_delta","delta":{"usage":{"output_tokens":12}}}"#,
        ));

        let result = acc.finalize();
        assert_eq!(result.output_text, "Hello there");
        assert_eq!(result.output_tokens, 12);
    }

    #[test]
    fn test_anthropic_root_usage_and_legacy_completion() {
        let mut acc = StreamUsageAccumulator::new(Protocol::Anthropic, "claude-2");
        acc.feed(&sse(r#"{"completion":"partial text","usage":{"output_tokens":5}}"#));

        let result = acc.finalize();
        assert_eq!(result.output_text, "partial text");
        assert_eq!(result.output_tokens, 5);
    }

    #[test]
    fn test_preview_truncation() {
        let mut acc = StreamUsageAccumulator::with_preview_chars(Protocol::OpenAi, "gpt-4", 8);
        acc.feed(&sse(r#"{"choices":[{"delta":{"content":"0123456789abcdef"}}]}"#));

        let result = acc.finalize();
        assert!(result.output_preview_truncated);
        assert_eq!(result.output_preview, "01234567");
        assert_eq!(result.output_text, "0123456789abcdef");
    }

    #[test]
    fn test_garbage_payloads_ignored() {
        let mut acc = StreamUsageAccumulator::new(Protocol::OpenAi, "gpt-4");
        acc.feed(b"data: not json at all\n\n");
        acc.feed(&sse(r#"{"choices":[{"delta":{"content":"ok"}}]}"#));
        assert_eq!(acc.finalize().output_text, "ok");
    }

    #[test]
    fn test_extract_output_tokens_variants() {
        let chat = ResponseBody::Json(serde_json::json!({
            "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
        }));
        assert_eq!(extract_output_tokens(&chat), Some(20));

        let messages = ResponseBody::Json(serde_json::json!({
            "usage": {"input_tokens": 10, "output_tokens": 15}
        }));
        assert_eq!(extract_output_tokens(&messages), Some(15));

        let totals_only = ResponseBody::Json(serde_json::json!({
            "usage": {"prompt_tokens": 10, "total_tokens": 30}
        }));
        assert_eq!(extract_output_tokens(&totals_only), Some(20));

        let raw = ResponseBody::Raw(Bytes::from(r#"{"usage":{"completion_tokens":9}}"#));
        assert_eq!(extract_output_tokens(&raw), Some(9));

        let nested = ResponseBody::Json(serde_json::json!({
            "message": {"usage": {"output_tokens": 4}}
        }));
        assert_eq!(extract_output_tokens(&nested), Some(4));

        assert_eq!(extract_output_tokens(&ResponseBody::Empty), None);
        assert_eq!(
            extract_output_tokens(&ResponseBody::Raw(Bytes::from("plain text"))),
            None
        );
        assert_eq!(
            extract_output_tokens(&ResponseBody::Json(serde_json::json!({"ok": true}))),
            None
        );
    }
}
