//! `cli` adapter: tools backed by a local command.
//!
//! Discovery runs the command once and reads a manual from its stdout. A call
//! runs the template's command with its args followed by `--<key> <value>` for
//! every tool argument. The child is killed if the call is cancelled or times out.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use utcp_registry::{OpenApiConverter, is_openapi_document};
use utcp_types::{
    CallTemplate, CliCallTemplate, CommunicationProtocol, Manual, ProtocolContext, RegisterManualResult, ToolArguments, UtcpError,
};
use utcp_util::{argument_to_string, cancellable_with_timeout, parse_text_content, try_parse_json_candidate};

#[derive(Debug, Default)]
pub struct CliProtocol;

impl CliProtocol {
    pub fn new() -> Self {
        Self
    }
}

fn cli_template(template: &CallTemplate) -> Result<&CliCallTemplate, UtcpError> {
    match template {
        CallTemplate::Cli(cli) => Ok(cli),
        other => Err(UtcpError::invalid_configuration(format!(
            "cli protocol cannot use a '{}' call template",
            other.call_template_type()
        ))),
    }
}

fn working_dir(root_dir: &Path, template: &CliCallTemplate) -> Option<PathBuf> {
    match template.working_dir.as_deref() {
        Some(dir) if Path::new(dir).is_absolute() => Some(PathBuf::from(dir)),
        Some(dir) => Some(root_dir.join(dir)),
        None if root_dir.is_dir() => Some(root_dir.to_path_buf()),
        None => None,
    }
}

/// `--<key> <value>` pairs in argument order.
fn argument_flags(arguments: &ToolArguments) -> Vec<String> {
    arguments
        .iter()
        .flat_map(|(key, value)| [format!("--{key}"), argument_to_string(value)])
        .collect()
}

fn build_command(context: &ProtocolContext, template: &CliCallTemplate, extra_args: Vec<String>) -> Result<Command, UtcpError> {
    let program = template.command.trim();
    if program.is_empty() {
        return Err(UtcpError::invalid_configuration(format!("cli template '{}' has no command", template.name)));
    }
    let mut command = Command::new(program);
    command.args(&template.args).args(extra_args);
    for (key, value) in &template.env {
        command.env(key, value);
    }
    if let Some(dir) = working_dir(&context.root_dir, template) {
        command.current_dir(dir);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    Ok(command)
}

/// Runs the command to completion and returns its stdout, failing on a non-zero exit.
async fn run(
    context: &ProtocolContext,
    template: &CliCallTemplate,
    extra_args: Vec<String>,
    cancel: &CancellationToken,
) -> Result<String, UtcpError> {
    let mut command = build_command(context, template, extra_args)?;
    let timeout = template.timeout.map(Duration::from_millis);
    let name = template.name.as_str();

    let exchange = async move {
        let child = command
            .spawn()
            .map_err(|error| UtcpError::transport(format!("failed to spawn '{}' for '{name}': {error}", template.command)))?;
        debug!(target: "utcp_client", manual = %name, pid = ?child.id(), "spawned cli tool");
        child
            .wait_with_output()
            .await
            .map_err(|error| UtcpError::transport(format!("failed to wait for '{}': {error}", template.command)))
    };
    let output = cancellable_with_timeout(cancel, "cli tool call", timeout, exchange).await?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(target: "utcp_client", manual = %name, status = %output.status, "cli tool failed");
        return Err(UtcpError::transport(format!(
            "command '{}' exited with {}: {}",
            template.command,
            output.status,
            stderr.trim()
        )));
    }
    Ok(stdout)
}

#[async_trait::async_trait]
impl CommunicationProtocol for CliProtocol {
    async fn register_manual(
        &self,
        context: &ProtocolContext,
        manual_call_template: &CallTemplate,
        cancel: &CancellationToken,
    ) -> Result<RegisterManualResult, UtcpError> {
        let template = cli_template(manual_call_template)?;
        let stdout = run(context, template, Vec::new(), cancel).await?;

        let document = try_parse_json_candidate(&stdout)
            .ok_or_else(|| UtcpError::transport(format!("output of '{}' is not a JSON document", template.command)))?;
        let manual = if is_openapi_document(&document) {
            OpenApiConverter::new(&template.name)
                .with_auth(template.auth.clone())
                .convert(&document)
        } else {
            serde_json::from_value::<Manual>(document)
                .map_err(|error| UtcpError::transport(format!("output of '{}' is not a UTCP manual: {error}", template.command)))?
        };
        Ok(RegisterManualResult::new(manual_call_template.clone(), manual, Vec::new()))
    }

    async fn call_tool(
        &self,
        context: &ProtocolContext,
        _tool_name: &str,
        arguments: &ToolArguments,
        tool_call_template: &CallTemplate,
        cancel: &CancellationToken,
    ) -> Result<Value, UtcpError> {
        let template = cli_template(tool_call_template)?;
        let stdout = run(context, template, argument_flags(arguments), cancel).await?;
        Ok(parse_text_content(stdout.trim_end()))
    }
}
