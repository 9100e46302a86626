//! Redaction of credentials before they reach log output.

use once_cell::sync::Lazy;
use regex::Regex;

static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(build_redact_patterns);

const SENSITIVE_HEADER_FRAGMENTS: &[&str] = &["authorization", "cookie", "token", "secret", "password", "api-key", "apikey", "key"];

fn build_redact_patterns() -> Vec<Regex> {
    [
        r"(?i)(authorization:\s*)([^\s]+(?:\s+[^\s]+)?)",
        r"(?i)((?:^|\b)Bearer\s+)([A-Za-z0-9\-._~+/]+=*)",
        r"(?i)((?:^|\b)Basic\s+)([A-Za-z0-9+/]+=*)",
        r"(?i)([A-Z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD)\s*=\s*)([^\s&]+)",
        r#"(?i)("(?:access_token|client_secret|password|api_key)"\s*:\s*")([^"]+)"#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("redaction regex should compile"))
    .collect()
}

/// Redacts values that look like secrets in a string.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in REDACT_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |captures: &regex::Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}<redacted>")
            })
            .into_owned();
    }
    redacted
}

/// Returns the header value for logging, hiding it when the header name suggests a credential.
pub fn redact_header_value(name: &str, value: &str) -> String {
    let lowered = name.to_ascii_lowercase();
    if SENSITIVE_HEADER_FRAGMENTS.iter().any(|fragment| lowered.contains(fragment)) {
        "<redacted>".to_string()
    } else {
        redact_sensitive(value)
    }
}
