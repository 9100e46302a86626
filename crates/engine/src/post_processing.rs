//! Transformations applied to tool results before they reach the caller.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use utcp_types::Tool;

/// Rewrites the result of a non-streaming tool call.
pub trait ToolPostProcessor: Send + Sync + fmt::Debug {
    fn post_process(&self, tool: &Tool, result: Value) -> Value;
}

/// Keeps only the listed keys of object results, per tool.
///
/// Tools are matched by their full name (`manual.tool`) or by the part after
/// the manual prefix. Results of unlisted tools and non-object results pass
/// through unchanged.
#[derive(Debug, Clone, Default)]
pub struct FilterDictPostProcessor {
    allowed_keys_by_tool: IndexMap<String, IndexSet<String>>,
}

impl FilterDictPostProcessor {
    pub fn new<I, K>(allowed_keys_by_tool: I) -> Self
    where
        I: IntoIterator<Item = (String, K)>,
        K: IntoIterator<Item = String>,
    {
        Self {
            allowed_keys_by_tool: allowed_keys_by_tool
                .into_iter()
                .map(|(tool, keys)| (tool, keys.into_iter().collect()))
                .collect(),
        }
    }

    fn allowed_keys(&self, tool_name: &str) -> Option<&IndexSet<String>> {
        self.allowed_keys_by_tool.get(tool_name).or_else(|| {
            tool_name
                .split_once('.')
                .and_then(|(_, short_name)| self.allowed_keys_by_tool.get(short_name))
        })
    }
}

impl ToolPostProcessor for FilterDictPostProcessor {
    fn post_process(&self, tool: &Tool, result: Value) -> Value {
        let Some(allowed) = self.allowed_keys(&tool.name) else {
            return result;
        };
        match result {
            Value::Object(fields) => Value::Object(fields.into_iter().filter(|(key, _)| allowed.contains(key)).collect()),
            other => other,
        }
    }
}
