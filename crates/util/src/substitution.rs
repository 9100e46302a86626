//! `${NAME}` / `$NAME` placeholder substitution over JSON values.
//!
//! Lookup order for a placeholder, first hit wins:
//! 1. the static variable table of the [`SubstitutionConfig`],
//! 2. each configured [`VariableLoader`] in order,
//! 3. the process environment.
//!
//! Loader and environment hits must be non-empty. When a namespace is given
//! the looked-up name becomes `namespace.replace('_', "__") + "_" + NAME`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;
use utcp_types::UtcpError;

static VARIABLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}|\$([A-Za-z0-9_]+)").expect("variable regex should compile"));

/// A source of variables consulted between the static table and the environment.
pub trait VariableLoader: Send + Sync + fmt::Debug {
    /// Returns the value for `name`, or `None` when this loader does not define it.
    fn get(&self, name: &str) -> Option<String>;
}

/// Variables available to a substitution.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionConfig {
    pub variables: HashMap<String, String>,
    pub loaders: Vec<Arc<dyn VariableLoader>>,
}

impl SubstitutionConfig {
    pub fn new(variables: HashMap<String, String>, loaders: Vec<Arc<dyn VariableLoader>>) -> Self {
        Self { variables, loaders }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn VariableLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Resolves one already-namespaced variable name.
    pub fn resolve(&self, namespaced_name: &str) -> Result<String, UtcpError> {
        if let Some(value) = self.variables.get(namespaced_name) {
            debug!(target: "utcp_substitution", variable = %namespaced_name, source = "config", "resolved variable");
            return Ok(value.clone());
        }

        for loader in &self.loaders {
            if let Some(value) = loader.get(namespaced_name).filter(|value| !value.is_empty()) {
                debug!(target: "utcp_substitution", variable = %namespaced_name, source = "loader", "resolved variable");
                return Ok(value);
            }
        }

        if let Ok(value) = std::env::var(namespaced_name)
            && !value.is_empty()
        {
            debug!(target: "utcp_substitution", variable = %namespaced_name, source = "env", "resolved variable");
            return Ok(value);
        }

        Err(UtcpError::variable_not_found(namespaced_name))
    }
}

/// Applies the namespace prefix used to keep manuals' variables apart.
///
/// `manual_openlibrary` + `API_KEY` becomes `manual__openlibrary_API_KEY`.
pub fn namespaced_variable_name(name: &str, namespace: Option<&str>) -> String {
    match namespace.filter(|namespace| !namespace.is_empty()) {
        Some(namespace) => format!("{}_{}", namespace.replace('_', "__"), name),
        None => name.to_string(),
    }
}

/// Resolves placeholders in JSON values.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableSubstitutor;

impl VariableSubstitutor {
    pub fn new() -> Self {
        Self
    }

    /// Returns a copy of `value` with every string leaf substituted.
    ///
    /// Object keys are left untouched. Fails on the first unresolvable name,
    /// in which case nothing is returned.
    pub fn substitute(&self, value: &Value, config: &SubstitutionConfig, namespace: Option<&str>) -> Result<Value, UtcpError> {
        match value {
            Value::String(text) => self.substitute_str(text, config, namespace).map(Value::String),
            Value::Array(items) => items
                .iter()
                .map(|item| self.substitute(item, config, namespace))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(fields) => {
                let mut substituted = serde_json::Map::with_capacity(fields.len());
                for (key, field) in fields {
                    substituted.insert(key.clone(), self.substitute(field, config, namespace)?);
                }
                Ok(Value::Object(substituted))
            }
            other => Ok(other.clone()),
        }
    }

    /// Substitutes placeholders in a single string.
    pub fn substitute_str(&self, input: &str, config: &SubstitutionConfig, namespace: Option<&str>) -> Result<String, UtcpError> {
        let mut output = String::with_capacity(input.len());
        let mut last_end = 0;
        for captures in VARIABLE_PATTERN.captures_iter(input) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let Some(name) = captures.get(1).or_else(|| captures.get(2)) else {
                continue;
            };
            output.push_str(&input[last_end..whole.start()]);
            output.push_str(&config.resolve(&namespaced_variable_name(name.as_str(), namespace))?);
            last_end = whole.end();
        }
        output.push_str(&input[last_end..]);
        Ok(output)
    }

    /// Collects every namespaced variable name referenced anywhere in `value`, in first-seen order.
    pub fn find_required_variables(&self, value: &Value, namespace: Option<&str>) -> IndexSet<String> {
        let mut names = IndexSet::new();
        collect_variables(value, namespace, &mut names);
        names
    }
}

fn collect_variables(value: &Value, namespace: Option<&str>, into: &mut IndexSet<String>) {
    match value {
        Value::String(text) => {
            for captures in VARIABLE_PATTERN.captures_iter(text) {
                if let Some(name) = captures.get(1).or_else(|| captures.get(2)) {
                    into.insert(namespaced_variable_name(name.as_str(), namespace));
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_variables(item, namespace, into)),
        Value::Object(fields) => fields.values().for_each(|field| collect_variables(field, namespace, into)),
        _ => {}
    }
}
