use serde::Serialize;

/// Gateway configuration, read from environment variables once at startup
/// and passed by parameter to the subsystems that need it.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub debug: bool,

    // Upstream HTTP
    /// Per-request upstream timeout in seconds.
    pub http_timeout_secs: u64,

    // Retry / failover
    pub retry: RetryConfig,

    // Generated API keys
    pub api_key_prefix: String,
    pub api_key_length: usize,

    // Admin login (token issuance is enabled only when both are set)
    pub admin: AdminConfig,

    // Field encryption key, raw env value (32 bytes, base64url)
    #[serde(skip)]
    pub encryption_key: Option<String>,

    // Log retention
    pub log_retention_days: u32,
    /// Hour of day (0-23) at which the retention sweep runs.
    pub log_cleanup_hour: u32,

    // Request body size limit (MB)
    pub body_limit_mb: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryConfig {
    /// Max retries on the same candidate for 5xx/transport failures.
    pub max_attempts: u32,
    /// Fixed sleep before each retry, in milliseconds.
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AdminConfig {
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
    pub token_ttl_secs: u64,
}

impl AdminConfig {
    pub fn is_enabled(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            debug: false,
            http_timeout_secs: 60,
            retry: RetryConfig {
                max_attempts: 3,
                delay_ms: 1000,
            },
            api_key_prefix: "lgw-".to_string(),
            api_key_length: 32,
            admin: AdminConfig {
                username: None,
                password: None,
                token_ttl_secs: 86400,
            },
            encryption_key: None,
            log_retention_days: 7,
            log_cleanup_hour: 4,
            body_limit_mb: 10,
        }
    }
}

impl Config {
    /// Build the configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            host: env_string("HOST", &defaults.host),
            port: env_parse("PORT", defaults.port),
            debug: env_bool("DEBUG", defaults.debug),
            http_timeout_secs: env_parse("HTTP_TIMEOUT", defaults.http_timeout_secs),
            retry: RetryConfig {
                max_attempts: env_parse("RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts),
                delay_ms: env_parse("RETRY_DELAY_MS", defaults.retry.delay_ms),
            },
            api_key_prefix: env_string("API_KEY_PREFIX", &defaults.api_key_prefix),
            api_key_length: env_parse("API_KEY_LENGTH", defaults.api_key_length),
            admin: AdminConfig {
                username: env_opt("ADMIN_USERNAME"),
                password: env_opt("ADMIN_PASSWORD"),
                token_ttl_secs: env_parse("ADMIN_TOKEN_TTL_SECONDS", defaults.admin.token_ttl_secs),
            },
            encryption_key: env_opt("ENCRYPTION_KEY"),
            log_retention_days: env_parse("LOG_RETENTION_DAYS", defaults.log_retention_days),
            log_cleanup_hour: env_parse("LOG_CLEANUP_HOUR", defaults.log_cleanup_hour).min(23),
            body_limit_mb: env_parse("BODY_LIMIT_MB", defaults.body_limit_mb),
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_string(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_opt(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_opt(key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8787);
        assert_eq!(cfg.http_timeout_secs, 60);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.delay_ms, 1000);
        assert_eq!(cfg.api_key_prefix, "lgw-");
        assert_eq!(cfg.api_key_length, 32);
        assert_eq!(cfg.admin.token_ttl_secs, 86400);
        assert_eq!(cfg.log_retention_days, 7);
        assert_eq!(cfg.log_cleanup_hour, 4);
        assert!(!cfg.admin.is_enabled());
    }

    #[test]
    fn test_admin_enabled_requires_both() {
        let mut admin = AdminConfig::default();
        admin.username = Some("admin".into());
        assert!(!admin.is_enabled());
        admin.password = Some("secret".into());
        assert!(admin.is_enabled());
    }
}
