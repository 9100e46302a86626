//! Tool definitions and their JSON Schema descriptors.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::call_template::CallTemplate;

/// The subset of JSON Schema used to describe tool inputs and outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(rename = "$id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// A type name or a list of type names.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, JsonSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(rename = "const", default, skip_serializing_if = "Option::is_none")]
    pub const_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(rename = "additionalProperties", default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(rename = "minLength", default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(rename = "maxLength", default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
}

impl JsonSchema {
    /// An empty `{"type": "object"}` schema.
    pub fn object() -> Self {
        Self {
            schema_type: Some(Value::String("object".to_string())),
            ..Self::default()
        }
    }

    /// Builds a schema from an arbitrary JSON value, falling back to an
    /// empty object schema when the value does not fit the model.
    pub fn from_value_lossy(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_else(|_| Self::object())
    }
}

/// One named, callable operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Globally unique name, conventionally `<manual>.<local>`.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: JsonSchema,
    #[serde(default)]
    pub outputs: JsonSchema,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_response_size: Option<u64>,
    pub tool_call_template: CallTemplate,
}

impl Tool {
    /// Creates a tool with object schemas and no tags.
    pub fn new(name: impl Into<String>, description: impl Into<String>, tool_call_template: CallTemplate) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            inputs: JsonSchema::object(),
            outputs: JsonSchema::object(),
            tags: Vec::new(),
            average_response_size: None,
            tool_call_template,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}
