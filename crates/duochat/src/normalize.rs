//! Text extraction from batch provider responses.
//!
//! The batch response shape is not stable across API revisions, so the text
//! is found by an ordered list of extraction rules. The first rule whose
//! predicate matches is used. A rule that matches but then trips over an
//! unexpected shape falls back to the whole response. Extraction never fails: when no
//! text can be found the caller gets [`NO_TEXT_PLACEHOLDER`]. That fallback
//! is lossy and only visible in the logs.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::RawResponse;

/// Shown instead of an empty reply.
pub const NO_TEXT_PLACEHOLDER: &str = "(no text returned from the provider)";

#[derive(Debug, Error)]
enum ShapeError {
    #[error("expected `{field}` to be {expected}")]
    UnexpectedType {
        field: &'static str,
        expected: &'static str,
    },
}

type Predicate = fn(&Value) -> bool;
type Extractor = fn(&Value) -> Result<String, ShapeError>;

/// Extraction rules in precedence order.
const RULES: &[(&str, Predicate, Extractor)] = &[
    ("candidates", has_candidates, from_candidates),
    ("text", has_text, from_text),
    ("content", has_content, from_content),
];

/// Extract displayable text from a batch response.
pub fn normalize_response(response: &RawResponse) -> String {
    let value = response.as_value();

    let text = match RULES.iter().find(|(_, matches, _)| matches(value)) {
        Some((rule, _, extract)) => extract(value).unwrap_or_else(|error| {
            debug!(rule, %error, "Extraction rule failed, using whole response");
            display_text(value)
        }),
        None => display_text(value),
    };

    let text = text.trim();
    if text.is_empty() {
        warn!(response = %response, "No text found in provider response");
        return NO_TEXT_PLACEHOLDER.to_string();
    }
    text.to_string()
}

/// `candidates[0].content.parts[*].text`, or `candidates[0].content` when
/// there are no parts.
fn from_candidates(value: &Value) -> Result<String, ShapeError> {
    let candidates = value["candidates"]
        .as_array()
        .ok_or(ShapeError::UnexpectedType {
            field: "candidates",
            expected: "an array",
        })?;
    let content = candidates
        .first()
        .and_then(|candidate| candidate.get("content"))
        .unwrap_or(&Value::Null);

    match content.get("parts") {
        Some(parts) if is_present(parts) => {
            let parts = parts.as_array().ok_or(ShapeError::UnexpectedType {
                field: "content.parts",
                expected: "an array",
            })?;
            Ok(parts
                .iter()
                .map(|part| match part.get("text") {
                    Some(text) if !text.is_null() => display_text(text),
                    _ => display_text(part),
                })
                .collect::<String>()
                .trim()
                .to_string())
        }
        _ => Ok(display_text(content).trim().to_string()),
    }
}

fn has_candidates(value: &Value) -> bool {
    has_field(value, "candidates")
}

fn has_text(value: &Value) -> bool {
    has_field(value, "text")
}

fn has_content(value: &Value) -> bool {
    has_field(value, "content")
}

fn from_text(value: &Value) -> Result<String, ShapeError> {
    Ok(field_text(value, "text"))
}

fn from_content(value: &Value) -> Result<String, ShapeError> {
    Ok(field_text(value, "content"))
}

fn has_field(value: &Value, field: &str) -> bool {
    value.get(field).is_some_and(is_present)
}

fn field_text(value: &Value, field: &str) -> String {
    value.get(field).map(display_text).unwrap_or_default()
}

/// Whether a value counts as "non-empty".
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Human-readable form of a value. Structured values have none.
fn display_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(value: Value) -> String {
        normalize_response(&RawResponse::new(value))
    }

    #[test]
    fn joins_candidate_parts() {
        let text = normalize(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hello" }, { "text": " world" }] },
                "finishReason": "STOP"
            }]
        }));
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn uses_first_candidate_only() {
        let text = normalize(json!({
            "candidates": [
                { "content": { "parts": [{ "text": " first " }] } },
                { "content": { "parts": [{ "text": "second" }] } }
            ]
        }));
        assert_eq!(text, "first");
    }

    #[test]
    fn part_without_text_uses_its_own_representation() {
        let text = normalize(json!({
            "candidates": [{ "content": { "parts": ["raw", { "text": "!" }, { "inlineData": {} }] } }]
        }));
        assert_eq!(text, "raw!");
    }

    #[test]
    fn candidate_content_without_parts_falls_back_to_content() {
        let text = normalize(json!({ "candidates": [{ "content": "  plain content " }] }));
        assert_eq!(text, "plain content");

        let text = normalize(json!({ "candidates": [{ "content": { "parts": [] } }] }));
        assert_eq!(text, NO_TEXT_PLACEHOLDER);
    }

    #[test]
    fn candidates_win_over_text() {
        let text = normalize(json!({
            "candidates": [{ "content": { "parts": [{ "text": "from candidates" }] } }],
            "text": "from text"
        }));
        assert_eq!(text, "from candidates");
    }

    #[test]
    fn text_field_is_trimmed() {
        assert_eq!(normalize(json!({ "text": "  hi  " })), "hi");
    }

    #[test]
    fn empty_candidates_fall_through_to_text() {
        assert_eq!(normalize(json!({ "candidates": [], "text": "hi" })), "hi");
    }

    #[test]
    fn content_field_is_used_after_text() {
        assert_eq!(
            normalize(json!({ "text": "", "content": " from content " })),
            "from content"
        );
    }

    #[test]
    fn bare_string_response_is_used_as_is() {
        assert_eq!(normalize(json!("  just text\n")), "just text");
    }

    #[test]
    fn unrecognized_shape_yields_placeholder() {
        assert_eq!(normalize(json!({})), NO_TEXT_PLACEHOLDER);
        assert_eq!(normalize(json!({ "usageMetadata": { "totalTokenCount": 3 } })), NO_TEXT_PLACEHOLDER);
        assert_eq!(normalize(Value::Null), NO_TEXT_PLACEHOLDER);
    }

    #[test]
    fn malformed_candidates_do_not_fail() {
        assert_eq!(
            normalize(json!({ "candidates": { "0": "odd" }, "text": "ignored" })),
            NO_TEXT_PLACEHOLDER
        );
        assert_eq!(
            normalize(json!({ "candidates": [{ "content": { "parts": "oops" } }] })),
            NO_TEXT_PLACEHOLDER
        );
        assert_eq!(normalize(json!({ "candidates": [42] })), NO_TEXT_PLACEHOLDER);
    }

    #[test]
    fn whitespace_only_text_yields_placeholder() {
        let text = normalize(json!({
            "candidates": [{ "content": { "parts": [{ "text": "  \n " }] } }]
        }));
        assert_eq!(text, NO_TEXT_PLACEHOLDER);
    }
}
