//! Strict JSON parsing of completion content

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonCompletionError {
    #[error("completion was empty")]
    Empty,
    #[error("completion is not valid JSON of the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
}

/// Parse `content` as exactly one JSON value of type `T`.
///
/// A single Markdown code fence around the value is tolerated (with or
/// without a `json` tag). Leading prose or trailing text is not.
pub fn parse_json_completion<T: DeserializeOwned>(content: &str) -> Result<T, JsonCompletionError> {
    let body = strip_code_fence(content.trim());
    if body.is_empty() {
        return Err(JsonCompletionError::Empty);
    }
    Ok(serde_json::from_str(body)?)
}

fn strip_code_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return content;
    };
    // Drop the info string (`json`) up to the first newline
    let inner = match inner.split_once('\n') {
        Some((info, body)) if !info.trim_start().starts_with('{') => body,
        _ => inner,
    };
    inner.trim()
}
