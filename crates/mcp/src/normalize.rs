//! Collapsing heterogeneous MCP response shapes into one value.

use serde_json::{Map, Value};
use utcp_util::{deserialize_to_closest, parse_text_content};

/// Decodes a raw response body and normalizes it; blank bodies become `null`.
pub fn normalize_tool_response(raw: &str) -> Value {
    deserialize_to_closest(raw).map(process_tool_result).unwrap_or(Value::Null)
}

/// Normalizes an already decoded response.
///
/// Checked in order: `structured_output` (or `structuredContent`), `content`,
/// `result`, then the payload itself. Strings go through [`parse_text_content`].
pub fn process_tool_result(value: Value) -> Value {
    match value {
        Value::String(text) => parse_text_content(&text),
        Value::Object(mut fields) => {
            if let Some(structured) = fields
                .remove("structured_output")
                .or_else(|| fields.remove("structuredContent"))
                .filter(|structured| !structured.is_null())
            {
                return parse_scalar(structured);
            }
            if let Some(content) = fields.remove("content") {
                match content {
                    Value::Array(items) => {
                        let mut values: Vec<Value> = items.into_iter().map(content_item).collect();
                        return if values.len() == 1 {
                            values.remove(0)
                        } else {
                            Value::Array(values)
                        };
                    }
                    Value::Object(item) => match extract_content(item) {
                        Ok(value) => return value,
                        // Nothing to extract; fall through to `result` or the payload.
                        Err(item) => {
                            fields.insert("content".into(), Value::Object(item));
                        }
                    },
                    other => return parse_scalar(other),
                }
            }
            if let Some(result) = fields.remove("result") {
                return process_tool_result(result);
            }
            Value::Object(fields)
        }
        other => other,
    }
}

fn content_item(item: Value) -> Value {
    match item {
        Value::Object(fields) => extract_content(fields).unwrap_or_else(Value::Object),
        other => parse_scalar(other),
    }
}

/// Pulls `text` or `json` out of a content element, handing the element back otherwise.
fn extract_content(mut fields: Map<String, Value>) -> Result<Value, Map<String, Value>> {
    if let Some(Value::String(text)) = fields.get("text") {
        return Ok(parse_text_content(text));
    }
    if let Some(json) = fields.remove("json") {
        return Ok(json);
    }
    Err(fields)
}

fn parse_scalar(value: Value) -> Value {
    match value {
        Value::String(text) => parse_text_content(&text),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_output_wins() {
        let value = process_tool_result(json!({
            "structured_output": "{\"temp\": 21}",
            "content": [{"type": "text", "text": "ignored"}]
        }));
        assert_eq!(value, json!({"temp": 21}));
    }

    #[test]
    fn test_singleton_content_collapses() {
        let value = process_tool_result(json!({"content": [{"type": "text", "text": "42"}]}));
        assert_eq!(value, json!(42));
    }

    #[test]
    fn test_content_list_mixes_text_and_json() {
        let value = process_tool_result(json!({
            "content": [
                {"type": "text", "text": "3.5"},
                {"type": "json", "json": {"ok": true}},
                {"type": "text", "text": "plain words"}
            ]
        }));
        assert_eq!(value, json!([3.5, {"ok": true}, "plain words"]));
    }

    #[test]
    fn test_content_object_and_result_field() {
        assert_eq!(process_tool_result(json!({"content": {"text": "[1,2]"}})), json!([1, 2]));
        assert_eq!(
            process_tool_result(json!({"jsonrpc": "2.0", "id": 1, "result": {"content": [{"text": "done"}]}})),
            json!("done")
        );
    }

    #[test]
    fn test_unrecognized_content_object_falls_through() {
        assert_eq!(process_tool_result(json!({"content": {"other": 1}, "result": "5"})), json!(5));
        assert_eq!(
            process_tool_result(json!({"content": {"other": 1}, "id": 3})),
            json!({"content": {"other": 1}, "id": 3})
        );
    }

    #[test]
    fn test_raw_payloads_pass_through() {
        assert_eq!(normalize_tool_response("  "), Value::Null);
        assert_eq!(normalize_tool_response("17"), json!(17));
        assert_eq!(normalize_tool_response("{\"a\": 1}"), json!({"a": 1}));
        assert_eq!(process_tool_result(json!([1, 2])), json!([1, 2]));
    }
}
