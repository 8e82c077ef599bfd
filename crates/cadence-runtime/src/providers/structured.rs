//! Structured output: JSON extraction and schema validation.
//!
//! A structured call either yields a value that satisfies its schema or
//! fails with [`ProviderError::InvalidResponse`]. Partial or guessed values
//! are never returned.

use serde_json::Value as JsonValue;

use super::{Completion, ProviderError, StructuredCompletion};

/// Append the schema the model must follow to a prompt.
pub fn with_schema_directive(prompt: &str, schema: &JsonValue) -> String {
    format!(
        "{}\n\nRespond with a single JSON document and nothing else. It must satisfy this JSON Schema:\n{}",
        prompt.trim_end(),
        schema
    )
}

/// Turn a raw completion into a schema-checked value.
pub fn finish(completion: Completion, schema: &JsonValue) -> Result<StructuredCompletion, ProviderError> {
    let value = parse_and_validate(&completion.text, schema)?;
    Ok(StructuredCompletion {
        value,
        usage: completion.usage,
        model: completion.model,
    })
}

/// Extract the JSON document from model output and validate it.
pub fn parse_and_validate(text: &str, schema: &JsonValue) -> Result<JsonValue, ProviderError> {
    let value = extract_json(text)?;
    validate(&value, schema)?;
    Ok(value)
}

/// Extract a JSON document, tolerating a fenced code block or prose around
/// a single object.
pub fn extract_json(text: &str) -> Result<JsonValue, ProviderError> {
    let candidate = fenced_block(text).unwrap_or_else(|| text.trim());

    if let Ok(value) = serde_json::from_str(candidate) {
        return Ok(value);
    }

    // Prose around one object: take the outermost braces
    if let (Some(start), Some(end)) = (candidate.find('{'), candidate.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&candidate[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(ProviderError::InvalidResponse(format!(
        "output is not a JSON document: {}",
        preview(text)
    )))
}

/// Validate `value` against `schema`, listing every violation.
pub fn validate(value: &JsonValue, schema: &JsonValue) -> Result<(), ProviderError> {
    let validator = jsonschema::options()
        .build(schema)
        .map_err(|e| ProviderError::InvalidResponse(format!("output schema does not compile: {}", e)))?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::InvalidResponse(format!(
            "output does not match schema: {}",
            errors.join("; ")
        )))
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip the info string (e.g. "json")
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 120;
    let trimmed = text.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
