//! Helpers shared by transports and templates.

use serde_json::Value;

/// Maximum length of a request/response body kept for logging.
pub const MAX_BODY_LENGTH: usize = 4000;

/// Truncates `s` to at most `max_len` bytes, on a char boundary.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

/// Replaces values of secret-looking keys (password, token, secret, api key,
/// credentials) with `"***"`, recursively.
pub fn redact_sensitive_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                let key_lower = key.to_lowercase();
                let is_sensitive = key_lower.contains("password")
                    || key_lower.contains("passwd")
                    || key_lower.contains("token")
                    || key_lower.contains("secret")
                    || key_lower.contains("api_key")
                    || key_lower.contains("apikey")
                    || key_lower.contains("credentials");

                if is_sensitive {
                    redacted.insert(key.clone(), Value::String("***".to_string()));
                } else if val.is_object() || val.is_array() {
                    redacted.insert(key.clone(), redact_sensitive_json(val));
                } else {
                    redacted.insert(key.clone(), val.clone());
                }
            }
            Value::Object(redacted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(redact_sensitive_json).collect()),
        _ => value.clone(),
    }
}

/// Escapes the five HTML-significant characters.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Normalises a phone number to `+<digits>` (E.164 shape).
///
/// Spaces, dashes, dots and parentheses are dropped. A leading `00` is read
/// as an international prefix. A number without prefix gets
/// `default_country_code` prepended, or is rejected when none is configured.
/// Returns `None` for anything that is not 8 to 15 digits afterwards.
///
/// # Examples
///
/// ```
/// use solfeo_notify::utils::normalize_phone;
///
/// assert_eq!(normalize_phone("+34 600-111-222", None).as_deref(), Some("+34600111222"));
/// assert_eq!(normalize_phone("600111222", Some("34")).as_deref(), Some("+34600111222"));
/// assert_eq!(normalize_phone("call me", Some("34")), None);
/// ```
pub fn normalize_phone(raw: &str, default_country_code: Option<&str>) -> Option<String> {
    let mut compact = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        match c {
            ' ' | '-' | '.' | '(' | ')' => {}
            '+' if compact.is_empty() => compact.push(c),
            c if c.is_ascii_digit() => compact.push(c),
            _ => return None,
        }
    }

    let digits = if let Some(rest) = compact.strip_prefix('+') {
        rest.to_string()
    } else if let Some(rest) = compact.strip_prefix("00") {
        rest.to_string()
    } else {
        let cc = default_country_code?
            .trim()
            .trim_start_matches('+');
        if cc.is_empty() || !cc.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        format!("{cc}{compact}")
    };

    if (8..=15).contains(&digits.len()) && !digits.starts_with('0') {
        Some(format!("+{digits}"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 5), "hello... [truncated]");
        assert_eq!(truncate_string("añb", 2), "a... [truncated]");
    }

    #[test]
    fn test_redact_sensitive_json() {
        let json = serde_json::json!({
            "smtp_username": "escuela",
            "smtp_password": "secret123",
            "access_token": "EAAG",
            "base_url": "http://localhost:3001",
            "nested": {
                "api_key": "xyz789",
                "phone_number_id": "1234"
            }
        });

        let redacted = redact_sensitive_json(&json);
        assert_eq!(redacted["smtp_username"], "escuela");
        assert_eq!(redacted["smtp_password"], "***");
        assert_eq!(redacted["access_token"], "***");
        assert_eq!(redacted["base_url"], "http://localhost:3001");
        assert_eq!(redacted["nested"]["api_key"], "***");
        assert_eq!(redacted["nested"]["phone_number_id"], "1234");
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<b>"Tom & Jerry's"</b>"#),
            "&lt;b&gt;&quot;Tom &amp; Jerry&#39;s&quot;&lt;/b&gt;"
        );
        assert_eq!(html_escape("Lección"), "Lección");
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("0034 600 111 222", None).as_deref(), Some("+34600111222"));
        assert_eq!(normalize_phone("(+34) 600.111.222", None).as_deref(), Some("+34600111222"));
        assert_eq!(normalize_phone("+34 (600) 111 222", None).as_deref(), Some("+34600111222"));
        assert_eq!(normalize_phone("600111222", None), None);
        assert_eq!(normalize_phone("600111222", Some("+34")).as_deref(), Some("+34600111222"));
        assert_eq!(normalize_phone("+12", None), None);
        assert_eq!(normalize_phone("+34 6001112223334445", None), None);
        assert_eq!(normalize_phone("", Some("34")), None);
    }
}
