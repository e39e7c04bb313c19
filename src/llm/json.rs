//! JSON extraction from model output.
//!
//! Models often wrap an otherwise valid object in commentary. Extraction
//! tries a strict parse first, then the span from the first `{` to the last
//! `}`. Both are ordinary outcomes, so the result is a value, not an error.

use serde_json::{Map, Value};
use tracing::debug;

/// Raw output characters kept for diagnosis when extraction fails.
pub const EXCERPT_CHARS: usize = 2000;

/// Outcome of extracting a JSON object from model text.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelJson {
    /// A JSON object was recovered.
    Parsed(Map<String, Value>),
    /// Nothing parseable; carries the leading part of the raw text.
    Malformed { excerpt: String },
}

/// Extract a JSON object from raw model output.
pub fn parse_model_json(raw: &str) -> ModelJson {
    let trimmed = raw.trim();

    if let Some(object) = parse_object(trimmed) {
        return ModelJson::Parsed(object);
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        if let Some(object) = parse_object(&trimmed[start..=end]) {
            debug!(
                leading = start,
                trailing = trimmed.len() - end - 1,
                "Recovered JSON object from surrounding text"
            );
            return ModelJson::Parsed(object);
        }
    }

    ModelJson::Malformed {
        excerpt: trimmed.chars().take(EXCERPT_CHARS).collect(),
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}
