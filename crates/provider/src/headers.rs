use std::collections::HashMap;

/// RFC 7230 hop-by-hop headers plus body framing headers that become
/// invalid once the gateway reframes (and possibly decompresses) the body.
const DROP_HEADERS: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
    "content-encoding",
];

/// Request headers never forwarded upstream: client credentials and headers
/// the HTTP client regenerates itself.
pub(crate) const STRIPPED_REQUEST_HEADERS: [&str; 6] = [
    "authorization",
    "x-api-key",
    "api-key",
    "content-length",
    "host",
    "content-type",
];

/// Remove hop-by-hop and framing headers from upstream response headers
/// before re-emitting them to the ingress client. Case-insensitive and
/// idempotent.
pub fn filter_upstream_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(key, _)| !DROP_HEADERS.contains(&key.to_ascii_lowercase().as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
