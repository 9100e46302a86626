//! Manuals and the outcome of registering them.

use serde::{Deserialize, Serialize};

use crate::call_template::CallTemplate;
use crate::tool::Tool;

/// Version stamped on manuals that do not carry one.
pub const DEFAULT_MANUAL_VERSION: &str = "1.0.0";

fn default_version() -> String {
    DEFAULT_MANUAL_VERSION.to_string()
}

/// A document describing a set of callable tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manual {
    #[serde(default = "default_version")]
    pub utcp_version: String,
    #[serde(default = "default_version")]
    pub manual_version: String,
    #[serde(default)]
    pub tools: Vec<Tool>,
}

impl Manual {
    pub fn new(tools: Vec<Tool>) -> Self {
        Self {
            utcp_version: default_version(),
            manual_version: default_version(),
            tools,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Default for Manual {
    fn default() -> Self {
        Self::empty()
    }
}

/// Outcome of registering one call template against its protocol.
///
/// Returned even when discovery partially failed; `errors` then holds one
/// entry per failure and `success` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterManualResult {
    pub manual_call_template: CallTemplate,
    pub manual: Manual,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl RegisterManualResult {
    /// A result whose success flag is derived from the error list.
    pub fn new(manual_call_template: CallTemplate, manual: Manual, errors: Vec<String>) -> Self {
        Self {
            manual_call_template,
            success: errors.is_empty(),
            manual,
            errors,
        }
    }

    /// A failed registration carrying an empty manual.
    pub fn failed(manual_call_template: CallTemplate, error: impl Into<String>) -> Self {
        Self::new(manual_call_template, Manual::empty(), vec![error.into()])
    }
}
