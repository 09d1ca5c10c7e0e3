//! Output sanitation — turns raw model text into structurally valid data.
//!
//! Models reply with near-JSON more often than JSON: single quotes, markdown
//! fences, scalar fields where lists are expected. The repair rules run in a
//! fixed order and each one is a pure function, so they can be tested (and
//! extended) independently of the parse step.

use serde_json::Value;
use thiserror::Error;

/// A recoverable decode failure. Carries the offending raw output so the
/// caller can show it once the retry budget runs out.
#[derive(Debug, Error)]
#[error("model output is not valid JSON: {reason}")]
pub struct SanitizeFailure {
    pub raw: String,
    pub reason: String,
}

/// Runs the full repair pipeline and strict parse over a structured reply.
///
/// Order matters: quote normalization first, then fence stripping, then the
/// parse, then list coercion on the parsed value.
pub fn sanitize(raw: &str) -> Result<Value, SanitizeFailure> {
    let text = normalize_quotes(raw);
    let text = strip_fences(&text);

    let value: Value = serde_json::from_str(text.trim()).map_err(|e| SanitizeFailure {
        raw: raw.to_string(),
        reason: e.to_string(),
    })?;

    Ok(coerce_list_fields(value))
}

/// Sanitizes a single-leaf rewrite reply down to plain text: fences stripped,
/// whitespace trimmed. An empty result is a recoverable failure.
pub fn sanitize_leaf(raw: &str) -> Result<String, SanitizeFailure> {
    let text = raw.trim();
    let text = match text.strip_prefix("```") {
        Some(fenced) => {
            // Drop the fence marker line (which may carry a language tag).
            let body = fenced.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
            body.trim_end_matches('`').trim()
        }
        None => text,
    };

    if text.is_empty() {
        return Err(SanitizeFailure {
            raw: raw.to_string(),
            reason: "empty rewrite".to_string(),
        });
    }
    Ok(text.to_string())
}

/// Coerces single-quoted near-JSON toward strict JSON.
pub fn normalize_quotes(raw: &str) -> String {
    raw.replace('\'', "\"")
}

/// Strips an incidental code-fence wrapper. If the text does not open with a
/// brace, the first line is assumed to be a fence marker and dropped, and
/// trailing backticks are removed.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }

    let body = match trimmed.split_once('\n') {
        Some((_first_line, rest)) => rest,
        None => "",
    };
    body.trim_end_matches('`').trim()
}

/// Wraps every non-list top-level value of an object in a one-element list.
/// Downstream consumers of section data always expect list-valued fields.
pub fn coerce_list_fields(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, field)| {
                    let field = match field {
                        Value::Array(_) => field,
                        other => Value::Array(vec![other]),
                    };
                    (key, field)
                })
                .collect(),
        ),
        other => other,
    }
}
