//! Secret redaction: scrubs credentials and image payloads out of text
//! before it reaches a log line or the UI.
//!
//! Upstream error bodies sometimes echo the request URL or headers back, and
//! a leaked key there ends up in logs that users paste into bug reports.

use crate::settings::Credentials;
use regex::Regex;
use std::sync::LazyLock;

pub struct RedactionResult {
    pub cleaned_text: String,
    pub redactions: Vec<Redaction>,
    pub has_redactions: bool,
}

pub struct Redaction {
    pub label: String,
    pub count: usize,
}

static SECRET_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        // Inline image data
        (
            Regex::new(r"data:image/[a-zA-Z+.-]+;base64,[A-Za-z0-9+/=]+").unwrap(),
            "image_data",
        ),
        // `key=...` / `api_key=...` query parameters
        (
            Regex::new(r"(?i)\b(api_?key|key|token)=[^&\s]+").unwrap(),
            "query_key",
        ),
        // Authorization headers
        (Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/-]+=*").unwrap(), "bearer"),
        // Google-style API keys
        (Regex::new(r"\bAIza[0-9A-Za-z_-]{35}\b").unwrap(), "api_key"),
        // Generic prefixed keys (sk-..., pk_..., api-...)
        (
            Regex::new(r"\b(sk|pk|api|key|token|secret)[-_][a-zA-Z0-9_-]{20,}\b").unwrap(),
            "api_key",
        ),
        // Long bare base64 runs, e.g. an echoed imageBase64 field
        (Regex::new(r"[A-Za-z0-9+/]{200,}={0,2}").unwrap(), "base64"),
    ]
});

/// Replace secret-shaped substrings with `[REDACTED:<label>]`.
pub fn redact_secrets(text: &str) -> RedactionResult {
    let mut cleaned = text.to_string();
    let mut redactions = Vec::new();

    for (pattern, label) in SECRET_PATTERNS.iter() {
        let count = pattern.find_iter(&cleaned).count();
        if count > 0 {
            redactions.push(Redaction {
                label: label.to_string(),
                count,
            });
            cleaned = pattern
                .replace_all(&cleaned, format!("[REDACTED:{}]", label).as_str())
                .to_string();
        }
    }

    let has_redactions = !redactions.is_empty();

    if has_redactions {
        let summary: Vec<String> = redactions
            .iter()
            .map(|r| format!("{} {}", r.count, r.label))
            .collect();
        log::debug!("[SAFETY] Redacted {}", summary.join(", "));
    }

    RedactionResult {
        cleaned_text: cleaned,
        redactions,
        has_redactions,
    }
}

/// Pattern redaction plus removal of the exact credential values in use.
pub fn scrub(text: &str, credentials: &Credentials) -> String {
    let mut cleaned = text.to_string();
    for (secret, label) in [
        (&credentials.analysis_api_key, "analysis_key"),
        (&credentials.upload_api_token, "upload_token"),
    ] {
        if secret.len() >= 4 {
            cleaned = cleaned.replace(secret.as_str(), &format!("[REDACTED:{}]", label));
        }
    }
    redact_secrets(&cleaned).cleaned_text
}
