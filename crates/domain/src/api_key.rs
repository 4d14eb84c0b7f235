use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A client-facing gateway credential. The plaintext `key_value` is shown
/// exactly once, at creation; list views must mask it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,
    pub key_name: String,
    pub key_value: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}
