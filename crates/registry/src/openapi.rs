//! OpenAPI / Swagger document to UTCP manual conversion.
//!
//! Every operation under `paths` becomes one tool named
//! `<manual>.<operationId>` (or `<manual>.<method>_<sanitized path>` when the
//! operation has no id), bound to an `http` call template that targets the
//! document's base URL joined with the operation path.

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value};
use thiserror::Error;
use tracing::debug;
use url::Url;
use utcp_types::{Auth, CallTemplate, HttpCallTemplate, JsonSchema, Manual, Tool, UtcpError};

const HTTP_METHODS: &[&str] = &["get", "put", "post", "delete", "patch", "head", "options", "trace"];
const FALLBACK_BASE_URL: &str = "http://localhost";
const MAX_REF_DEPTH: usize = 8;

/// Errors emitted by OpenAPI conversion.
#[derive(Debug, Error)]
pub enum OpenApiConversionError {
    /// Source was not valid JSON or YAML.
    #[error("source content is not valid JSON or YAML: {0}")]
    SourceParse(String),
    /// Source parsed but does not look like an OpenAPI or Swagger document.
    #[error("document is not an OpenAPI or Swagger specification")]
    NotOpenApi,
}

impl From<OpenApiConversionError> for UtcpError {
    fn from(error: OpenApiConversionError) -> Self {
        UtcpError::invalid_configuration(error.to_string())
    }
}

/// Parses OpenAPI source content given as JSON or YAML.
pub fn parse_openapi_document_value(source_content: &str) -> Result<Value, OpenApiConversionError> {
    serde_json::from_str::<Value>(source_content)
        .or_else(|_| serde_yaml::from_str::<Value>(source_content))
        .map_err(|error| OpenApiConversionError::SourceParse(error.to_string()))
}

/// Whether a parsed document carries an `openapi` or `swagger` version marker.
pub fn is_openapi_document(document: &Value) -> bool {
    document.get("openapi").is_some() || document.get("swagger").is_some()
}

/// Converts OpenAPI documents into manuals for one manual name.
#[derive(Debug, Clone)]
pub struct OpenApiConverter {
    manual_name: String,
    discovery_url: Option<Url>,
    auth: Option<Auth>,
}

impl OpenApiConverter {
    pub fn new(manual_name: impl Into<String>) -> Self {
        Self {
            manual_name: manual_name.into(),
            discovery_url: None,
            auth: None,
        }
    }

    /// URL the document was fetched from; used to resolve relative or missing servers.
    pub fn with_discovery_url(mut self, discovery_url: &str) -> Self {
        self.discovery_url = Url::parse(discovery_url).ok();
        self
    }

    /// Auth copied onto every generated tool template.
    pub fn with_auth(mut self, auth: Option<Auth>) -> Self {
        self.auth = auth;
        self
    }

    /// Parses and converts JSON or YAML source content.
    pub fn convert_str(&self, source_content: &str) -> Result<Manual, OpenApiConversionError> {
        let document = parse_openapi_document_value(source_content)?;
        if !is_openapi_document(&document) {
            return Err(OpenApiConversionError::NotOpenApi);
        }
        Ok(self.convert(&document))
    }

    /// Converts an already parsed document.
    pub fn convert(&self, document: &Value) -> Manual {
        let base_url = self.resolve_base_url(document);
        let mut tools = Vec::new();

        let Some(paths) = document.get("paths").and_then(Value::as_object) else {
            return Manual::empty();
        };

        for (path, path_item) in paths {
            let Some(path_item) = path_item.as_object() else {
                continue;
            };
            let shared_parameters = path_item.get("parameters").and_then(Value::as_array);

            for (method_key, operation) in path_item {
                let method_lower = method_key.to_ascii_lowercase();
                if !HTTP_METHODS.contains(&method_lower.as_str()) {
                    continue;
                }
                let Some(operation) = operation.as_object() else {
                    continue;
                };
                tools.push(self.build_tool(document, &base_url, path, &method_lower, operation, shared_parameters));
            }
        }

        debug!(target: "utcp_openapi", manual = %self.manual_name, tools = tools.len(), base_url = %base_url, "converted OpenAPI document");
        Manual::new(tools)
    }

    fn build_tool(
        &self,
        document: &Value,
        base_url: &str,
        path: &str,
        method_lower: &str,
        operation: &JsonMap<String, Value>,
        shared_parameters: Option<&Vec<Value>>,
    ) -> Tool {
        let tool_name = operation
            .get("operationId")
            .and_then(Value::as_str)
            .filter(|operation_id| !operation_id.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{method_lower}_{}", sanitize_path(path)));
        let full_name = if self.manual_name.trim().is_empty() {
            tool_name
        } else {
            format!("{}.{}", self.manual_name, tool_name)
        };

        let description = operation
            .get("summary")
            .or_else(|| operation.get("description"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let tags = operation
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        let template = CallTemplate::Http(HttpCallTemplate {
            name: self.manual_name.clone(),
            auth: self.auth.clone(),
            method: method_lower.to_ascii_uppercase(),
            url: join_url(base_url, path),
            headers: IndexMap::new(),
            body: None,
            timeout: None,
        });

        Tool {
            name: full_name,
            description,
            inputs: build_input_schema(document, operation, shared_parameters),
            outputs: build_output_schema(document, operation),
            tags,
            average_response_size: None,
            tool_call_template: template,
        }
    }

    fn resolve_base_url(&self, document: &Value) -> String {
        if let Some(server) = document.get("servers").and_then(Value::as_array).and_then(|servers| servers.first()) {
            let raw = server.get("url").and_then(Value::as_str).unwrap_or_default();
            let expanded = expand_server_variables(raw, server.get("variables"));
            if !expanded.trim().is_empty() {
                return self.absolutize(expanded.trim());
            }
        }

        if let Some(host) = document.get("host").and_then(Value::as_str) {
            let scheme = document
                .get("schemes")
                .and_then(Value::as_array)
                .and_then(|schemes| schemes.first())
                .and_then(Value::as_str)
                .unwrap_or("https");
            let base_path = document.get("basePath").and_then(Value::as_str).unwrap_or_default();
            return format!("{scheme}://{host}{base_path}");
        }

        match &self.discovery_url {
            Some(discovery_url) => discovery_url.origin().ascii_serialization(),
            None => FALLBACK_BASE_URL.to_string(),
        }
    }

    fn absolutize(&self, server_url: &str) -> String {
        if server_url.to_ascii_lowercase().starts_with("http") {
            return server_url.to_string();
        }
        if server_url.starts_with('/')
            && let Some(discovery_url) = &self.discovery_url
            && let Ok(joined) = discovery_url.join(server_url)
        {
            return joined.to_string();
        }
        format!("https://{}", server_url.trim_start_matches('/'))
    }
}

fn sanitize_path(path: &str) -> String {
    path.trim_matches('/').replace(['/', '{', '}'], "_")
}

fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn expand_server_variables(url: &str, variables: Option<&Value>) -> String {
    let Some(variables) = variables.and_then(Value::as_object) else {
        return url.to_string();
    };
    variables.iter().fold(url.to_string(), |expanded, (name, variable)| {
        match variable.get("default").and_then(Value::as_str) {
            Some(default) => expanded.replace(&format!("{{{name}}}"), default),
            None => expanded,
        }
    })
}

fn build_input_schema(document: &Value, operation: &JsonMap<String, Value>, shared_parameters: Option<&Vec<Value>>) -> JsonSchema {
    let mut properties: IndexMap<String, JsonSchema> = IndexMap::new();
    let mut required: Vec<String> = Vec::new();

    let operation_parameters = operation.get("parameters").and_then(Value::as_array);
    let parameters = shared_parameters.into_iter().flatten().chain(operation_parameters.into_iter().flatten());
    for parameter in parameters {
        let parameter = resolve_refs(document, parameter, 0);
        let Some(name) = parameter.get("name").and_then(Value::as_str) else {
            continue;
        };
        let mut schema = parameter
            .get("schema")
            .map(|schema| JsonSchema::from_value_lossy(&resolve_refs(document, schema, 0)))
            .unwrap_or_else(|| JsonSchema {
                schema_type: parameter.get("type").cloned(),
                ..JsonSchema::default()
            });
        if schema.description.is_none() {
            schema.description = parameter.get("description").and_then(Value::as_str).map(str::to_string);
        }
        if parameter.get("required").and_then(Value::as_bool).unwrap_or(false) && !required.iter().any(|r| r == name) {
            required.push(name.to_string());
        }
        properties.insert(name.to_string(), schema);
    }

    if let Some(body_schema) = operation
        .get("requestBody")
        .map(|body| resolve_refs(document, body, 0))
        .and_then(|body| json_content_schema(&body))
    {
        let body_schema = JsonSchema::from_value_lossy(&resolve_refs(document, &body_schema, 0));
        for (name, property) in body_schema.properties.unwrap_or_default() {
            properties.insert(name, property);
        }
        for name in body_schema.required.unwrap_or_default() {
            if !required.contains(&name) {
                required.push(name);
            }
        }
    }

    JsonSchema {
        properties: (!properties.is_empty()).then_some(properties),
        required: (!required.is_empty()).then_some(required),
        ..JsonSchema::object()
    }
}

fn build_output_schema(document: &Value, operation: &JsonMap<String, Value>) -> JsonSchema {
    let Some(responses) = operation.get("responses").and_then(Value::as_object) else {
        return JsonSchema::object();
    };
    responses
        .iter()
        .find(|(status, _)| status.starts_with('2'))
        .map(|(_, response)| resolve_refs(document, response, 0))
        .and_then(|response| json_content_schema(&response).or_else(|| response.get("schema").cloned()))
        .map(|schema| JsonSchema::from_value_lossy(&resolve_refs(document, &schema, 0)))
        .unwrap_or_else(JsonSchema::object)
}

fn json_content_schema(holder: &Value) -> Option<Value> {
    let content = holder.get("content")?.as_object()?;
    content
        .iter()
        .find(|(media_type, _)| media_type.contains("json"))
        .or_else(|| content.iter().next())
        .and_then(|(_, media)| media.get("schema").cloned())
}

/// Inlines local `#/...` references, up to a fixed depth to stop on cycles.
fn resolve_refs(document: &Value, value: &Value, depth: usize) -> Value {
    if depth >= MAX_REF_DEPTH {
        return value.clone();
    }
    match value {
        Value::Object(fields) => {
            if let Some(reference) = fields.get("$ref").and_then(Value::as_str)
                && let Some(pointer) = reference.strip_prefix('#')
                && let Some(target) = document.pointer(pointer)
            {
                return resolve_refs(document, target, depth + 1);
            }
            Value::Object(
                fields
                    .iter()
                    .map(|(key, field)| (key.clone(), resolve_refs(document, field, depth + 1)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(|item| resolve_refs(document, item, depth + 1)).collect()),
        other => other.clone(),
    }
}
