use std::collections::HashMap;

/// Header names whose values are masked before logging.
const SENSITIVE_HEADERS: [&str; 3] = ["authorization", "x-api-key", "api-key"];

/// Mask an authorization-style value, keeping a `Bearer ` prefix and a few
/// characters for identification: `<first4>***...***<last2>`, or `***` for
/// tokens of 8 characters or fewer.
pub fn sanitize_authorization(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let bearer = value
        .get(..7)
        .is_some_and(|p| p.eq_ignore_ascii_case("bearer "));
    let (prefix, token) = if bearer {
        ("Bearer ", &value[7..])
    } else {
        ("", value)
    };

    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return format!("{prefix}***");
    }

    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{prefix}{head}***...***{tail}")
}

/// Return a new header map with sensitive values masked. The input is never
/// mutated.
pub fn sanitize_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(key, value)| {
            if SENSITIVE_HEADERS.contains(&key.to_ascii_lowercase().as_str()) {
                (key.clone(), sanitize_authorization(value))
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}

/// Mask an API key for list views.
pub fn mask_api_key_display(key_value: &str) -> String {
    sanitize_authorization(key_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_prefix_preserved() {
        let masked = sanitize_authorization("Bearer sk-1234567890abcdef");
        assert_eq!(masked, "Bearer sk-1***...***ef");
        assert!(masked.starts_with("Bearer "));
        assert!(masked.contains("***"));
    }

    #[test]
    fn test_short_token_fully_masked() {
        assert_eq!(sanitize_authorization("Bearer short"), "Bearer ***");
        assert_eq!(sanitize_authorization("tiny"), "***");
        assert_eq!(sanitize_authorization("12345678"), "***");
    }

    #[test]
    fn test_pure_token() {
        assert_eq!(
            sanitize_authorization("lgw-abcdefghijklmnop"),
            "lgw-***...***op"
        );
    }

    #[test]
    fn test_empty_value() {
        assert_eq!(sanitize_authorization(""), "");
    }

    #[test]
    fn test_sanitize_headers_masks_sensitive_only() {
        let headers = HashMap::from([
            ("Authorization".to_string(), "Bearer sk-1234567890".to_string()),
            ("X-Api-Key".to_string(), "lgw-1234567890abcd".to_string()),
            ("content-type".to_string(), "application/json".to_string()),
        ]);

        let sanitized = sanitize_headers(&headers);
        assert!(sanitized["Authorization"].contains("***"));
        assert!(sanitized["X-Api-Key"].contains("***"));
        assert_eq!(sanitized["content-type"], "application/json");
        // original untouched
        assert_eq!(headers["content-type"], "application/json");
        assert!(!headers["Authorization"].contains('*'));
    }
}
