use lgw_domain::provider::Protocol;
use serde_json::Value;

/// Seam for cross-protocol request translation, invoked when the ingress
/// dialect differs from the selected provider's dialect. An adapter returns
/// the body to send and may rewrite the upstream path.
pub trait ProtocolAdapter: Send + Sync {
    fn adapt_request(
        &self,
        from: Protocol,
        to: Protocol,
        path: &str,
        body: &Value,
    ) -> (String, Value);
}

/// Identity adapter: no semantic translation, the body and path pass through
/// unchanged (the model field rewrite happens in the forwarding layer).
pub struct PassthroughAdapter;

impl ProtocolAdapter for PassthroughAdapter {
    fn adapt_request(
        &self,
        _from: Protocol,
        _to: Protocol,
        path: &str,
        body: &Value,
    ) -> (String, Value) {
        (path.to_string(), body.clone())
    }
}
