//! Heuristics for turning loosely typed text payloads into JSON values.

use serde_json::{Number, Value};

/// Parses `text` as JSON when, once trimmed, it is wrapped in `{}`, `[]` or `""`.
pub fn try_parse_json_candidate(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    let wrapped = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
        || (trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"'));
    if !wrapped {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Interprets text as JSON, then as an integer, then as a float, else keeps it as a string.
pub fn parse_text_content(text: &str) -> Value {
    if let Some(parsed) = try_parse_json_candidate(text) {
        return parsed;
    }

    let trimmed = text.trim();
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Value::Number(integer.into());
    }
    if let Ok(float) = trimmed.parse::<f64>()
        && let Some(number) = Number::from_f64(float)
    {
        return Value::Number(number);
    }

    Value::String(text.to_string())
}

/// Decodes a raw payload into the closest value: `None` when blank, parsed JSON
/// when it looks like JSON, the trimmed text otherwise.
pub fn deserialize_to_closest(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(try_parse_json_candidate(trimmed).unwrap_or_else(|| Value::String(trimmed.to_string())))
}

/// Parses a response body as JSON when possible, otherwise returns it as text.
pub fn parse_response_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}
