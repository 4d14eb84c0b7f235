use crate::error::GatewayError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Marker distinguishing encrypted values from legacy plaintext.
pub const ENCRYPTION_PREFIX: &str = "enc:";

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;

/// AES-256-GCM field encryption for data at rest (provider API keys).
///
/// Values are stored as `enc:<base64url(nonce || ciphertext)>`. Read-only
/// after construction; share behind an `Arc`.
pub struct Encryption {
    cipher: Aes256Gcm,
}

impl Encryption {
    /// Build from the raw `ENCRYPTION_KEY` env value (32 bytes, base64url).
    /// With no key configured, a process-local ephemeral key is generated:
    /// values encrypted under it cannot be read after a restart.
    pub fn from_env_value(raw: Option<&str>) -> Result<Self, GatewayError> {
        let key = match raw {
            Some(encoded) => {
                let decoded = b64url_decode(encoded).map_err(|_| {
                    GatewayError::Config("ENCRYPTION_KEY is not valid base64url".to_string())
                })?;
                if decoded.len() != KEY_LENGTH {
                    return Err(GatewayError::Config(format!(
                        "ENCRYPTION_KEY must be {KEY_LENGTH} bytes, got {}",
                        decoded.len()
                    )));
                }
                let mut key = [0u8; KEY_LENGTH];
                key.copy_from_slice(&decoded);
                key
            }
            None => {
                tracing::warn!(
                    "ENCRYPTION_KEY is not set; using an ephemeral key. \
                     Encrypted values will be unreadable after restart."
                );
                rand::random::<[u8; KEY_LENGTH]>()
            }
        };

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| GatewayError::Config(format!("failed to initialize cipher: {e}")))?;
        Ok(Self { cipher })
    }

    /// Generate a fresh random key in the env-variable encoding.
    pub fn generate_key() -> String {
        URL_SAFE_NO_PAD.encode(rand::random::<[u8; KEY_LENGTH]>())
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, GatewayError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let nonce_bytes = rand::random::<[u8; NONCE_LENGTH]>();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| GatewayError::Config("encryption failed".to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{ENCRYPTION_PREFIX}{}", URL_SAFE_NO_PAD.encode(combined)))
    }

    /// Decrypt a stored value. Values without the `enc:` prefix are legacy
    /// plaintext and pass through unchanged. A wrong key or corrupted
    /// ciphertext is a configuration error, not an auth error.
    pub fn decrypt(&self, value: &str) -> Result<String, GatewayError> {
        let Some(encoded) = value.strip_prefix(ENCRYPTION_PREFIX) else {
            return Ok(value.to_string());
        };

        let combined = b64url_decode(encoded)
            .map_err(|_| GatewayError::Config("invalid encrypted value encoding".to_string()))?;
        if combined.len() < NONCE_LENGTH {
            return Err(GatewayError::Config(
                "encrypted value is too short".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LENGTH);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| {
                GatewayError::Config(
                    "failed to decrypt value: wrong key or corrupted ciphertext".to_string(),
                )
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| GatewayError::Config("decrypted value is not UTF-8".to_string()))
    }

    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(ENCRYPTION_PREFIX)
    }
}

/// Decode base64url, tolerating both padded and unpadded inputs.
fn b64url_decode(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('='))
}
