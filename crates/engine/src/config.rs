//! Client configuration.
//!
//! ```json
//! {
//!   "variables": {"weather__api_API_KEY": "..."},
//!   "load_variables_from": [{"variable_loader_type": "dotenv", "env_file_path": ".env"}],
//!   "manual_call_templates": [{"call_template_type": "http", "name": "weather_api", "url": "..."}],
//!   "post_processing": [{"tool_post_processor_type": "filter_dict", "allowed_keys_by_tool": {"weather_api.current": ["temp"]}}]
//! }
//! ```
//!
//! YAML with the same shape is accepted as well.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use utcp_types::{CallTemplate, PolymorphicRegistry, SerializerValidationError, UtcpError};
use utcp_util::{DotEnvVariableLoader, SubstitutionConfig, VariableLoader};

use crate::post_processing::{FilterDictPostProcessor, ToolPostProcessor};

const VARIABLE_LOADER_TYPE_FIELD: &str = "variable_loader_type";
const POST_PROCESSOR_TYPE_FIELD: &str = "tool_post_processor_type";

/// Errors raised while loading a client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("configuration is not valid JSON or YAML: {0}")]
    Parse(String),
    #[error(transparent)]
    Validation(#[from] SerializerValidationError),
}

impl From<ConfigError> for UtcpError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::Validation(validation) => UtcpError::SerializerValidation(validation),
            other => UtcpError::invalid_configuration(other.to_string()),
        }
    }
}

/// A source of variables listed under `load_variables_from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variable_loader_type", rename_all = "snake_case")]
pub enum VariableLoaderConfig {
    Dotenv { env_file_path: PathBuf },
}

/// A result transformation listed under `post_processing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool_post_processor_type", rename_all = "snake_case")]
pub enum PostProcessorConfig {
    FilterDict {
        #[serde(default)]
        allowed_keys_by_tool: IndexMap<String, Vec<String>>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UtcpClientConfig {
    /// Static variable table, consulted before loaders and the environment.
    pub variables: IndexMap<String, String>,
    pub load_variables_from: Vec<VariableLoaderConfig>,
    /// Manuals registered when the client is created.
    pub manual_call_templates: Vec<CallTemplate>,
    pub post_processing: Vec<PostProcessorConfig>,
}

#[derive(Deserialize)]
struct RawClientConfig {
    #[serde(default)]
    variables: IndexMap<String, String>,
    #[serde(default)]
    load_variables_from: Vec<Value>,
    #[serde(default)]
    manual_call_templates: Vec<Value>,
    #[serde(default)]
    post_processing: Vec<Value>,
}

impl UtcpClientConfig {
    /// Reads a JSON or YAML configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(target: "utcp_client", path = %path.display(), "loading client configuration");
        Self::from_json_str(&contents)
    }

    /// Parses configuration text; JSON first, then YAML.
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let value = serde_json::from_str::<Value>(contents)
            .or_else(|_| serde_yaml::from_str::<Value>(contents))
            .map_err(|error| ConfigError::Parse(error.to_string()))?;
        Self::from_value(value)
    }

    /// Decodes an already parsed document, validating every discriminator.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let value = if value.is_null() { Value::Object(Default::default()) } else { value };
        let raw: RawClientConfig = serde_json::from_value(value).map_err(|error| ConfigError::Parse(error.to_string()))?;

        let registry = PolymorphicRegistry::global();
        let manual_call_templates = raw
            .manual_call_templates
            .into_iter()
            .map(|template| registry.decode_call_template(template))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            variables: raw.variables,
            load_variables_from: raw
                .load_variables_from
                .into_iter()
                .map(|entry| decode_tagged(entry, VARIABLE_LOADER_TYPE_FIELD, "variable loader", &["dotenv"]))
                .collect::<Result<_, _>>()?,
            manual_call_templates,
            post_processing: raw
                .post_processing
                .into_iter()
                .map(|entry| decode_tagged(entry, POST_PROCESSOR_TYPE_FIELD, "tool post processor", &["filter_dict"]))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Builds the substitution config: the static table plus one loader per
    /// `load_variables_from` entry, with relative paths resolved against `root_dir`.
    pub fn substitution_config(&self, root_dir: &Path) -> Result<SubstitutionConfig, ConfigError> {
        let variables: HashMap<String, String> = self.variables.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let mut loaders: Vec<Arc<dyn VariableLoader>> = Vec::with_capacity(self.load_variables_from.len());
        for loader in &self.load_variables_from {
            match loader {
                VariableLoaderConfig::Dotenv { env_file_path } => {
                    let path = if env_file_path.is_absolute() {
                        env_file_path.clone()
                    } else {
                        root_dir.join(env_file_path)
                    };
                    let dotenv = DotEnvVariableLoader::from_path(&path).map_err(|source| ConfigError::Read { path, source })?;
                    loaders.push(Arc::new(dotenv));
                }
            }
        }
        Ok(SubstitutionConfig::new(variables, loaders))
    }

    /// Instantiates the configured post-processors in order.
    pub fn post_processors(&self) -> Vec<Arc<dyn ToolPostProcessor>> {
        self.post_processing
            .iter()
            .map(|processor| match processor {
                PostProcessorConfig::FilterDict { allowed_keys_by_tool } => Arc::new(FilterDictPostProcessor::new(
                    allowed_keys_by_tool.iter().map(|(tool, keys)| (tool.clone(), keys.clone())),
                )) as Arc<dyn ToolPostProcessor>,
            })
            .collect()
    }
}

impl<'de> Deserialize<'de> for UtcpClientConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Self::from_value(Value::deserialize(deserializer)?).map_err(D::Error::custom)
    }
}

/// Checks the discriminator against `known` before handing the entry to serde,
/// so unknown kinds surface as a validation error naming the discriminator.
fn decode_tagged<T: serde::de::DeserializeOwned>(
    mut entry: Value,
    field: &str,
    kind: &str,
    known: &[&str],
) -> Result<T, SerializerValidationError> {
    let discriminator = entry
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| SerializerValidationError::missing_discriminator(field))?;
    if !known.contains(&discriminator.as_str()) {
        return Err(SerializerValidationError::unknown_discriminator(kind, discriminator));
    }
    if let Some(fields) = entry.as_object_mut() {
        fields.insert(field.to_string(), Value::String(discriminator.clone()));
    }
    serde_json::from_value(entry).map_err(|error| SerializerValidationError::invalid_payload(discriminator, error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_full_json_config() {
        let config = UtcpClientConfig::from_json_str(
            r#"{
              "variables": {"weather_API_KEY": "k"},
              "load_variables_from": [{"variable_loader_type": "dotenv", "env_file_path": ".env"}],
              "manual_call_templates": [{"call_template_type": "http", "name": "weather", "url": "https://w.test/utcp"}],
              "post_processing": [{"tool_post_processor_type": "filter_dict", "allowed_keys_by_tool": {"weather.now": ["temp"]}}]
            }"#,
        )
        .expect("config");

        assert_eq!(config.variables["weather_API_KEY"], "k");
        assert_eq!(
            config.load_variables_from,
            vec![VariableLoaderConfig::Dotenv {
                env_file_path: PathBuf::from(".env")
            }]
        );
        assert_eq!(config.manual_call_templates[0].call_template_type(), "http");
        assert_eq!(config.post_processors().len(), 1);
    }

    #[test]
    fn test_yaml_and_empty_documents() {
        let config = UtcpClientConfig::from_json_str("variables:\n  A: b\n").expect("yaml");
        assert_eq!(config.variables["A"], "b");
        assert_eq!(UtcpClientConfig::from_json_str("{}").expect("empty"), UtcpClientConfig::default());
    }

    #[test]
    fn test_unknown_discriminators_are_validation_errors() {
        let error = UtcpClientConfig::from_json_str(r#"{"load_variables_from": [{"variable_loader_type": "vault"}]}"#)
            .expect_err("unknown loader");
        match error {
            ConfigError::Validation(validation) => assert_eq!(validation.discriminator.as_deref(), Some("vault")),
            other => panic!("unexpected error {other:?}"),
        }

        let error = UtcpClientConfig::from_json_str(r#"{"manual_call_templates": [{"call_template_type": "smoke", "name": "x"}]}"#)
            .expect_err("unknown template");
        assert!(matches!(UtcpError::from(error), UtcpError::SerializerValidation(_)));
    }

    #[test]
    fn test_dotenv_paths_resolve_against_root() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::write(root.path().join("vars.env"), "TOKEN=abc\n").expect("write env");
        let config = UtcpClientConfig {
            load_variables_from: vec![VariableLoaderConfig::Dotenv {
                env_file_path: PathBuf::from("vars.env"),
            }],
            ..UtcpClientConfig::default()
        };

        let substitution = config.substitution_config(root.path()).expect("substitution");
        assert_eq!(substitution.resolve("TOKEN").expect("token"), "abc");
    }

    #[test]
    fn test_from_path_reports_missing_file() {
        let error = UtcpClientConfig::from_path("/definitely/not/here.json").expect_err("missing");
        assert!(matches!(error, ConfigError::Read { .. }));
    }
}
