use super::StructuringError;

/// Normalise a model reply before JSON parsing: newlines become spaces,
/// Markdown code fences are dropped, surrounding whitespace trimmed.
pub fn clean_response(raw: &str) -> String {
    raw.replace('\n', " ")
        .trim()
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Parse a model reply into JSON.
///
/// Failure is reported as [`StructuringError::SchemaMapping`] carrying the
/// cleaned reply so callers can surface what the model actually said.
pub fn parse_mapping_response(raw: &str) -> Result<serde_json::Value, StructuringError> {
    let cleaned = clean_response(raw);
    serde_json::from_str(&cleaned).map_err(|e| StructuringError::SchemaMapping {
        reason: e.to_string(),
        response: cleaned,
    })
}
