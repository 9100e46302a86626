//! The contract every communication protocol adapter implements.

use std::path::PathBuf;

use serde_json::{Map as JsonMap, Value};
use tokio_util::sync::CancellationToken;

use crate::call_template::CallTemplate;
use crate::error::UtcpError;
use crate::manual::RegisterManualResult;
use crate::stream::ToolStream;

/// Arguments passed to a tool call.
pub type ToolArguments = JsonMap<String, Value>;

/// Host information handed to adapters on every operation.
#[derive(Debug, Clone, Default)]
pub struct ProtocolContext {
    /// Directory that relative file paths resolve against.
    pub root_dir: PathBuf,
}

impl ProtocolContext {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self { root_dir: root_dir.into() }
    }
}

/// Turns a call template into registrations and invocations on one transport.
///
/// Every method that performs I/O receives a cancellation token and must stop
/// waiting, releasing whatever it opened, once the token fires.
#[async_trait::async_trait]
pub trait CommunicationProtocol: Send + Sync {
    /// Discovers the manual behind a manual call template.
    async fn register_manual(
        &self,
        context: &ProtocolContext,
        manual_call_template: &CallTemplate,
        cancel: &CancellationToken,
    ) -> Result<RegisterManualResult, UtcpError>;

    /// Releases anything held for a manual. Most adapters hold nothing.
    async fn deregister_manual(
        &self,
        _context: &ProtocolContext,
        _manual_call_template: &CallTemplate,
        _cancel: &CancellationToken,
    ) -> Result<(), UtcpError> {
        Ok(())
    }

    /// Invokes one tool and returns its result.
    async fn call_tool(
        &self,
        context: &ProtocolContext,
        tool_name: &str,
        arguments: &ToolArguments,
        tool_call_template: &CallTemplate,
        cancel: &CancellationToken,
    ) -> Result<Value, UtcpError>;

    /// Invokes one tool and streams its results.
    async fn call_tool_streaming(
        &self,
        _context: &ProtocolContext,
        tool_name: &str,
        _arguments: &ToolArguments,
        tool_call_template: &CallTemplate,
        _cancel: &CancellationToken,
    ) -> Result<ToolStream, UtcpError> {
        Err(UtcpError::unsupported(format!(
            "streaming is not supported for '{}' call templates (tool '{tool_name}')",
            tool_call_template.call_template_type()
        )))
    }
}
