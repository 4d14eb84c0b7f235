use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: u32 = 1;

/// Stateless signed admin token: `<payload_b64>.<sig_b64>` where the payload
/// is base64url JSON and the signature is HMAC-SHA256 over the payload text,
/// keyed by SHA-256 of `<username> || NUL || <password>`. No external
/// storage is involved in verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub v: u32,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub nonce: String,
}

pub fn is_admin_auth_enabled(username: Option<&str>, password: Option<&str>) -> bool {
    username.is_some_and(|u| !u.is_empty()) && password.is_some_and(|p| !p.is_empty())
}

fn signing_key(username: &str, password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

fn sign(payload_b64: &str, username: &str, password: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(&signing_key(username, password))
        .expect("HMAC accepts any key length");
    mac.update(payload_b64.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Issue a token for the admin user, valid for `ttl_seconds` from `now`
/// (`None` = current time).
pub fn create_admin_token(
    username: &str,
    password: &str,
    ttl_seconds: u64,
    now: Option<i64>,
) -> String {
    let issued_at = now.unwrap_or_else(|| chrono::Utc::now().timestamp());
    let claims = AdminClaims {
        v: TOKEN_VERSION,
        sub: username.to_string(),
        iat: issued_at,
        exp: issued_at + ttl_seconds as i64,
        nonce: URL_SAFE_NO_PAD.encode(rand::random::<[u8; 16]>()),
    };

    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("claims serialize"));
    let signature_b64 = URL_SAFE_NO_PAD.encode(sign(&payload_b64, username, password));

    format!("{payload_b64}.{signature_b64}")
}

/// Verify a token: constant-time signature check, then version, subject and
/// expiry. Returns the claims on success.
pub fn verify_admin_token(
    token: &str,
    username: &str,
    password: &str,
    now: Option<i64>,
) -> Option<AdminClaims> {
    let (payload_b64, signature_b64) = token.split_once('.')?;

    let actual_sig = URL_SAFE_NO_PAD
        .decode(signature_b64.trim_end_matches('='))
        .ok()?;
    let mut mac = HmacSha256::new_from_slice(&signing_key(username, password)).ok()?;
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&actual_sig).ok()?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64.trim_end_matches('='))
        .ok()?;
    let claims: AdminClaims = serde_json::from_slice(&payload).ok()?;

    if claims.v != TOKEN_VERSION {
        return None;
    }
    if claims.sub != username {
        return None;
    }

    let current = now.unwrap_or_else(|| chrono::Utc::now().timestamp());
    if current >= claims.exp {
        return None;
    }

    Some(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let token = create_admin_token("admin", "secret", 3600, Some(1_000_000));
        let claims = verify_admin_token(&token, "admin", "secret", Some(1_000_100)).unwrap();
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.v, 1);
        assert_eq!(claims.iat, 1_000_000);
        assert_eq!(claims.exp, 1_003_600);
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = create_admin_token("admin", "secret", 60, Some(1_000_000));
        assert!(verify_admin_token(&token, "admin", "secret", Some(1_000_060)).is_none());
        assert!(verify_admin_token(&token, "admin", "secret", Some(1_000_059)).is_some());
    }

    #[test]
    fn test_wrong_credentials_rejected() {
        let token = create_admin_token("admin", "secret", 3600, Some(1_000_000));
        assert!(verify_admin_token(&token, "admin", "other", Some(1_000_100)).is_none());
        assert!(verify_admin_token(&token, "root", "secret", Some(1_000_100)).is_none());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = create_admin_token("admin", "secret", 3600, Some(1_000_000));
        let (_, sig) = token.split_once('.').unwrap();
        let forged_payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(
            serde_json::json!({"v": 1, "sub": "admin", "iat": 0, "exp": i64::MAX, "nonce": "x"})
                .to_string(),
        );
        assert!(
            verify_admin_token(&format!("{forged_payload}.{sig}"), "admin", "secret", None)
                .is_none()
        );
    }

    #[test]
    fn test_malformed_token_rejected() {
        assert!(verify_admin_token("no-dot-here", "admin", "secret", None).is_none());
        assert!(verify_admin_token("a.b", "admin", "secret", None).is_none());
        assert!(verify_admin_token("", "admin", "secret", None).is_none());
    }

    #[test]
    fn test_enabled_check() {
        assert!(is_admin_auth_enabled(Some("admin"), Some("pw")));
        assert!(!is_admin_auth_enabled(Some("admin"), None));
        assert!(!is_admin_auth_enabled(Some(""), Some("pw")));
        assert!(!is_admin_auth_enabled(None, None));
    }
}
