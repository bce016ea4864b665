//! Interpretation of a successful analysis response body.
//!
//! The proxy normally answers `{solution}`, but it may also pass through the
//! upstream model's raw shape, so both are accepted.

use super::AnalysisError;
use serde_json::Value;

/// Prefix of the displayable text produced for a content-safety block.
pub const BLOCKED_PREFIX: &str = "Content blocked by Gemini: ";

/// Turns a 2xx body into display text.
///
/// Order: the proxy's `solution`; the first text part of the first candidate;
/// a prompt-feedback block reason (a valid result, not an error); an `error`
/// field; anything else is malformed.
pub fn interpret_analysis_body(body: &Value) -> Result<String, AnalysisError> {
    if let Some(solution) = body["solution"].as_str() {
        return Ok(solution.to_string());
    }

    if let Some(text) = body["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .filter(|t| !t.is_empty())
    {
        return Ok(text.to_string());
    }

    if let Some(reason) = body["promptFeedback"]["blockReason"]
        .as_str()
        .filter(|r| !r.is_empty())
    {
        log::warn!("[ANALYZE] Content blocked upstream: {}", reason);
        return Ok(format!("{}{}", BLOCKED_PREFIX, reason));
    }

    if let Some(error) = body["error"].as_str() {
        return Err(AnalysisError::UpstreamRejection {
            status: None,
            message: error.to_string(),
        });
    }

    let keys: Vec<&str> = body
        .as_object()
        .map(|o| o.keys().map(String::as_str).collect())
        .unwrap_or_default();
    Err(AnalysisError::MalformedResponse(format!(
        "no text or block reason (keys: [{}])",
        keys.join(", ")
    )))
}
