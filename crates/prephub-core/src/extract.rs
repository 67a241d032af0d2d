//! Payload recovery from free-form model output.
//!
//! Models wrap JSON in markdown fences, prepend chatter ("Here is your
//! answer:") and append sign-offs. The extractor strips that noise and
//! attempts a strict parse. It never validates what the payload means;
//! that is left to the shape gates in [`crate::schema`].

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    // ```json ... ``` takes priority over any other fence
    static ref JSON_FENCE: Regex = Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap();

    // Any fence, optional language tag on the opening line
    static ref ANY_FENCE: Regex =
        Regex::new(r"(?s)```[A-Za-z0-9_+.#-]*[ \t]*\r?\n?(.*?)\s*```").unwrap();

    static ref FENCE_MARKER: Regex = Regex::new(r"```[A-Za-z0-9_+.#-]*[ \t]*\r?\n?").unwrap();
}

/// Stateless extractor shared by every call site.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseExtractor;

impl ResponseExtractor {
    /// Recover a JSON object or array from raw model text.
    ///
    /// Returns `None` when nothing parseable is found. Callers treat that
    /// as "this backend produced unusable output", never as a hard error.
    pub fn extract_structured(raw: &str) -> Option<Value> {
        extract_structured(raw)
    }

    /// Plain text is taken as-is, minus surrounding whitespace.
    pub fn extract_plain_text(raw: &str) -> String {
        extract_plain_text(raw)
    }
}

/// See [`ResponseExtractor::extract_structured`].
pub fn extract_structured(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // A bare body may carry fences inside its string values.
    if let Ok(value @ (Value::Object(_) | Value::Array(_))) =
        serde_json::from_str::<Value>(trimmed)
    {
        return Some(value);
    }

    let unfenced = JSON_FENCE
        .captures(trimmed)
        .or_else(|| ANY_FENCE.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    let candidate = slice_json_region(unfenced);

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "Structured extraction failed");
            None
        }
    }
}

/// See [`ResponseExtractor::extract_plain_text`].
pub fn extract_plain_text(raw: &str) -> String {
    raw.trim().to_string()
}

/// Remove every markdown fence marker, keeping the fenced content.
///
/// Used for outputs that must be bare code.
pub fn strip_code_fences(raw: &str) -> String {
    FENCE_MARKER.replace_all(raw, "").trim().to_string()
}

/// Slice from the first opening delimiter to the last matching closer.
///
/// Whichever of `{` / `[` appears first decides whether we look for an
/// object or an array. Text with no usable region is returned unchanged.
fn slice_json_region(text: &str) -> &str {
    let first_brace = text.find('{');
    let first_bracket = text.find('[');

    let (start, closer) = match (first_brace, first_bracket) {
        (Some(brace), Some(bracket)) if brace < bracket => (brace, '}'),
        (Some(_), Some(bracket)) => (bracket, ']'),
        (Some(brace), None) => (brace, '}'),
        (None, Some(bracket)) => (bracket, ']'),
        (None, None) => return text,
    };

    match text.rfind(closer) {
        Some(end) if end > start => &text[start..=end],
        _ => text,
    }
}
