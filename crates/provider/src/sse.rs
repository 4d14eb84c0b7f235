/// Incremental decoder for `text/event-stream` framing.
///
/// Bytes are fed in arbitrary chunks; complete events (terminated by a blank
/// line) come back as their joined `data:` payloads. CRLF is normalized to
/// LF and the trailing partial event stays buffered until more bytes arrive.
/// All event fields other than `data:` are ignored.
#[derive(Default)]
pub struct SseParser {
    buf: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the data payloads of every event completed
    /// by it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        if chunk.is_empty() {
            return Vec::new();
        }

        let mut data = std::mem::take(&mut self.buf);
        data.extend_from_slice(chunk);
        let data = normalize_crlf(&data);

        let mut events = split_events(&data);
        // Keep the unterminated tail for the next feed.
        self.buf = events.pop().unwrap_or_default().to_vec();

        events
            .into_iter()
            .filter_map(extract_data_payload)
            .collect()
    }
}

fn normalize_crlf(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'\r' && data.get(i + 1) == Some(&b'\n') {
            out.push(b'\n');
            i += 2;
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}

/// Collect the `data:` lines of one event block, joined with LF.
/// Returns `None` for blocks without data (comments, bare `event:` lines).
fn extract_data_payload(event: &[u8]) -> Option<String> {
    let mut data_lines: Vec<&[u8]> = Vec::new();
    for line in event.split(|&b| b == b'\n') {
        if let Some(mut value) = line.strip_prefix(b"data:") {
            if value.first() == Some(&b' ') {
                value = &value[1..];
            }
            data_lines.push(value);
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&data_lines.join(&b'\n')).to_string())
}

/// Split on blank-line event boundaries, keeping the (possibly empty) tail.
fn split_events(data: &[u8]) -> Vec<&[u8]> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + 1 < data.len() {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            parts.push(&data[start..i]);
            i += 2;
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&data[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(b"data: {\"x\":1}\n\n");
        assert_eq!(payloads, vec!["{\"x\":1}".to_string()]);
    }

    #[test]
    fn test_partial_event_buffers_until_complete() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"x\"").is_empty());
        assert!(parser.feed(b":1}").is_empty());
        let payloads = parser.feed(b"\n\ndata: [DONE]\n\n");
        assert_eq!(payloads, vec!["{\"x\":1}".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn test_arbitrary_chunking_yields_same_events() {
        let raw = b"data: one\n\ndata: two\n\ndata: three\n\n";
        for chunk_size in [1, 2, 3, 5, 7, raw.len()] {
            let mut parser = SseParser::new();
            let mut payloads = Vec::new();
            for chunk in raw.chunks(chunk_size) {
                payloads.extend(parser.feed(chunk));
            }
            assert_eq!(payloads, vec!["one", "two", "three"], "chunk_size={chunk_size}");
        }
    }

    #[test]
    fn test_crlf_framing() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(b"data: a\r\n\r\ndata: b\r\n\r\n");
        assert_eq!(payloads, vec!["a", "b"]);
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: a\r").is_empty());
        let payloads = parser.feed(b"\n\r\n");
        assert_eq!(payloads, vec!["a"]);
    }

    #[test]
    fn test_multiline_data_joined_with_lf() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(b"data: line1\ndata: line2\n\n");
        assert_eq!(payloads, vec!["line1\nline2"]);
    }

    #[test]
    fn test_non_data_fields_ignored() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(b"event: message_start\nid: 7\nretry: 100\ndata: x\n\n");
        assert_eq!(payloads, vec!["x"]);

        // Comment-only event yields nothing
        assert!(parser.feed(b": keepalive\n\n").is_empty());
    }

    #[test]
    fn test_data_without_space() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(b"data:{\"compact\":true}\n\n");
        assert_eq!(payloads, vec!["{\"compact\":true}"]);
    }

    #[test]
    fn test_empty_feed() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"").is_empty());
    }
}
