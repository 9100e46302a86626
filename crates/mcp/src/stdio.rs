//! Process exchange for command-backed MCP servers.
//!
//! Each exchange spawns the server, optionally writes one request line to its
//! stdin and closes it, reads stdout to EOF and waits for exit. Stderr lines
//! are forwarded to `tracing`.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tracing::debug;
use utcp_types::{McpServerConfig, UtcpError};

/// Builds the command for a server config, running in `working_dir` when given.
pub(crate) fn build_stdio_command(server_name: &str, server: &McpServerConfig, working_dir: Option<&Path>) -> Result<Command, UtcpError> {
    let program = server
        .command
        .as_deref()
        .filter(|command| !command.trim().is_empty())
        .ok_or_else(|| UtcpError::invalid_configuration(format!("MCP server '{server_name}' has no command")))?;

    let mut command = Command::new(program);
    command.args(&server.args);
    for (key, value) in &server.env {
        command.env(key, value);
    }
    if let Some(dir) = working_dir.filter(|dir| dir.is_dir()) {
        command.current_dir(dir);
    }
    command.kill_on_drop(server.terminate_on_close.unwrap_or(true));
    Ok(command)
}

/// Runs one request/response exchange and returns the captured stdout.
pub(crate) async fn run_exchange(
    server_name: &str,
    server: &McpServerConfig,
    working_dir: Option<&Path>,
    request_line: Option<String>,
) -> Result<String, UtcpError> {
    let mut command = build_stdio_command(server_name, server, working_dir)?;
    command
        .stdin(if request_line.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|error| UtcpError::transport(format!("failed to spawn MCP server '{server_name}': {error}")))?;
    debug!(target: "utcp_mcp", server = %server_name, pid = ?child.id(), "spawned MCP server");

    if let Some(stderr) = child.stderr.take() {
        spawn_stderr_logger(server_name.to_string(), stderr);
    }

    if let Some(line) = request_line
        && let Some(mut stdin) = child.stdin.take()
    {
        // A server that exits without reading its input still gets its stdout read.
        if let Err(error) = stdin.write_all(line.as_bytes()).await {
            debug!(target: "utcp_mcp", server = %server_name, error = %error, "failed to write MCP request");
        }
        if let Err(error) = stdin.shutdown().await {
            debug!(target: "utcp_mcp", server = %server_name, error = %error, "failed to close MCP server stdin");
        }
    }

    let mut stdout = String::new();
    if let Some(mut pipe) = child.stdout.take() {
        pipe.read_to_string(&mut stdout)
            .await
            .map_err(|error| UtcpError::transport(format!("failed to read output of MCP server '{server_name}': {error}")))?;
    }

    let status = child
        .wait()
        .await
        .map_err(|error| UtcpError::transport(format!("failed to wait for MCP server '{server_name}': {error}")))?;
    if !status.success() {
        return Err(UtcpError::transport(format!("MCP server '{server_name}' exited with {status}")));
    }
    Ok(stdout)
}

/// Picks the response document out of captured stdout.
///
/// Servers may print log lines before the response; when the whole output is
/// not one JSON document, the last line that is one wins.
pub(crate) fn response_payload(stdout: &str) -> &str {
    let trimmed = stdout.trim();
    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return trimmed;
    }
    trimmed
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| serde_json::from_str::<serde_json::Value>(line).is_ok())
        .unwrap_or(trimmed)
}

fn spawn_stderr_logger(server_name: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "utcp_mcp", server = %server_name, stderr = %line, "MCP server stderr");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_payload_skips_log_lines() {
        let stdout = "starting server\n{\"result\": 1}\n";
        assert_eq!(response_payload(stdout), "{\"result\": 1}");
        assert_eq!(response_payload("  plain text  "), "plain text");
    }

    #[test]
    fn test_missing_command_is_rejected() {
        let error = build_stdio_command("empty", &McpServerConfig::default(), None).expect_err("no command");
        assert!(matches!(error, UtcpError::InvalidConfiguration { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exchange_echoes_request_line() {
        let server = McpServerConfig {
            command: Some("sh".into()),
            args: vec!["-c".into(), "cat".into()],
            ..McpServerConfig::default()
        };
        let stdout = run_exchange("cat", &server, None, Some("{\"id\":1}\n".into())).await.expect("exchange");
        assert_eq!(stdout.trim(), "{\"id\":1}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_a_transport_failure() {
        let server = McpServerConfig {
            command: Some("sh".into()),
            args: vec!["-c".into(), "echo boom >&2; exit 3".into()],
            ..McpServerConfig::default()
        };
        let error = run_exchange("failing", &server, None, None).await.expect_err("exit code");
        assert!(error.is_transport());
    }
}
