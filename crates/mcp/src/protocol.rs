//! The MCP communication protocol.
//!
//! A template either names several backend servers (`servers` or
//! `config.mcpServers`) or uses the legacy single-transport fields
//! (`transport` + `command`/`url`). Discovery aggregates the tools of every
//! server and records per-server failures; calls try servers in order until
//! one answers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use indexmap::IndexMap;
use reqwest::Client;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utcp_types::{
    CallTemplate, CommunicationProtocol, JsonSchema, Manual, McpCallTemplate, McpServerConfig, McpTransport, ProtocolContext,
    RegisterManualResult, Tool, ToolArguments, ToolChunk, ToolStream, UtcpError,
};
use utcp_util::{SseEvent, cancellable_with_timeout, deserialize_to_closest, forward_sse_stream};

use crate::http::{ServerRequest, is_event_stream};
use crate::normalize::process_tool_result;
use crate::oauth::OAuthTokenCache;
use crate::stdio;

/// Discriminator this protocol is registered under.
pub const MCP_CALL_TEMPLATE_TYPE: &str = "mcp";

const ALL_SERVERS_FAILED: &str = "Tool call failed on all configured MCP servers";

#[derive(Debug, Clone)]
struct NamedServer {
    name: String,
    config: McpServerConfig,
}

impl NamedServer {
    fn timeout(&self) -> Option<Duration> {
        self.config.timeout_seconds.map(Duration::from_secs)
    }
}

/// Multi-server MCP adapter.
#[derive(Debug)]
pub struct McpProtocol {
    client: Client,
    tokens: Arc<OAuthTokenCache>,
    next_request_id: AtomicU64,
}

impl Default for McpProtocol {
    fn default() -> Self {
        Self::with_client(Client::new())
    }
}

impl McpProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            tokens: Arc::new(OAuthTokenCache::new()),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Shares an OAuth2 token cache with other adapters.
    pub fn with_token_cache(mut self, tokens: Arc<OAuthTokenCache>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn token_cache(&self) -> &Arc<OAuthTokenCache> {
        &self.tokens
    }

    fn request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    fn server_request<'a>(&'a self, template: &'a McpCallTemplate, server: &'a NamedServer, url: &'a str) -> ServerRequest<'a> {
        ServerRequest {
            client: &self.client,
            tokens: &self.tokens,
            auth: template.auth.as_ref(),
            server_name: &server.name,
            url,
            headers: &server.config.headers,
        }
    }

    async fn discover(
        &self,
        context: &ProtocolContext,
        template: &McpCallTemplate,
        server: &NamedServer,
        cancel: &CancellationToken,
    ) -> Result<Vec<Tool>, UtcpError> {
        let raw = match server.config.url.as_deref() {
            Some(url) => {
                let request = self.server_request(template, server, url);
                cancellable_with_timeout(cancel, "MCP discovery", server.timeout(), request.fetch_listing(cancel)).await?
            }
            None => {
                let exchange = stdio::run_exchange(&server.name, &server.config, Some(&context.root_dir), None);
                cancellable_with_timeout(cancel, "MCP discovery", server.timeout(), exchange).await?
            }
        };
        parse_listed_tools(&server.name, stdio::response_payload(&raw), template)
    }

    async fn call_server(
        &self,
        context: &ProtocolContext,
        template: &McpCallTemplate,
        server: &NamedServer,
        tool_name: &str,
        arguments: &ToolArguments,
        cancel: &CancellationToken,
    ) -> Result<Value, UtcpError> {
        let raw = match server.config.url.as_deref() {
            Some(url) => {
                let envelope = json!({"toolName": tool_name, "arguments": arguments});
                let request = self.server_request(template, server, url);
                cancellable_with_timeout(cancel, "MCP tool call", server.timeout(), request.post_call(&envelope, cancel)).await?
            }
            None => {
                let request = json!({
                    "jsonrpc": "2.0",
                    "id": self.request_id(),
                    "method": "tools/call",
                    "params": {"name": tool_name, "arguments": arguments},
                });
                let line = format!("{request}\n");
                let exchange = stdio::run_exchange(&server.name, &server.config, Some(&context.root_dir), Some(line));
                cancellable_with_timeout(cancel, "MCP tool call", server.timeout(), exchange).await?
            }
        };
        decode_call_response(&server.name, stdio::response_payload(&raw))
    }

    async fn open_stream(
        &self,
        template: &McpCallTemplate,
        server: &NamedServer,
        url: &str,
        tool_name: &str,
        arguments: &ToolArguments,
        cancel: &CancellationToken,
    ) -> Result<ToolStream, UtcpError> {
        let envelope = json!({"toolName": tool_name, "arguments": arguments});
        let request = self.server_request(template, server, url);
        let response =
            cancellable_with_timeout(cancel, "MCP stream", server.timeout(), request.open_event_stream(&envelope, cancel)).await?;

        if !is_event_stream(&response) {
            let body = response
                .text()
                .await
                .map_err(|error| UtcpError::transport(format!("failed to read response from MCP server '{}': {error}", server.name)))?;
            return Ok(ToolStream::once(decode_call_response(&server.name, &body)));
        }

        let (sender, stream) = ToolStream::channel(cancel);
        let read_timeout = server.config.sse_read_timeout_seconds.map(Duration::from_secs);
        let server_name = server.name.clone();
        tokio::spawn(async move {
            forward_sse_stream(&server_name, response.bytes_stream(), sender, read_timeout, |event| {
                decode_event(&server_name, event)
            })
            .await;
            debug!(target: "utcp_mcp", server = %server_name, "MCP stream finished");
        });
        Ok(stream)
    }
}

#[async_trait::async_trait]
impl CommunicationProtocol for McpProtocol {
    async fn register_manual(
        &self,
        context: &ProtocolContext,
        manual_call_template: &CallTemplate,
        cancel: &CancellationToken,
    ) -> Result<RegisterManualResult, UtcpError> {
        let template = mcp_template(manual_call_template)?;
        let servers = resolve_servers(template)?;

        let mut tools: IndexMap<String, Tool> = IndexMap::new();
        let mut errors = Vec::new();
        for server in &servers {
            match self.discover(context, template, server, cancel).await {
                Ok(found) => {
                    debug!(target: "utcp_mcp", manual = %template.name, server = %server.name, tools = found.len(), "discovered MCP tools");
                    for tool in found {
                        tools.entry(tool.name.clone()).or_insert(tool);
                    }
                }
                Err(error @ UtcpError::Cancelled { .. }) => return Err(error),
                Err(error) => {
                    warn!(target: "utcp_mcp", manual = %template.name, server = %server.name, error = %error, "MCP discovery failed");
                    errors.push(format!("{}: {error}", server.name));
                }
            }
        }

        info!(target: "utcp_mcp", manual = %template.name, servers = servers.len(), tools = tools.len(), errors = errors.len(), "registered MCP manual");
        Ok(RegisterManualResult::new(
            manual_call_template.clone(),
            Manual::new(tools.into_values().collect()),
            errors,
        ))
    }

    async fn call_tool(
        &self,
        context: &ProtocolContext,
        tool_name: &str,
        arguments: &ToolArguments,
        tool_call_template: &CallTemplate,
        cancel: &CancellationToken,
    ) -> Result<Value, UtcpError> {
        let template = mcp_template(tool_call_template)?;
        let servers = resolve_servers(template)?;
        let server_tool_name = server_tool_name(&template.name, tool_name);

        if template.configured_servers().is_none()
            && let Some(server) = servers.first()
        {
            return self.call_server(context, template, server, server_tool_name, arguments, cancel).await;
        }

        let mut failures = Vec::new();
        for server in &servers {
            match self.call_server(context, template, server, server_tool_name, arguments, cancel).await {
                Ok(value) => return Ok(value),
                Err(error @ UtcpError::Cancelled { .. }) => return Err(error),
                Err(error) => {
                    debug!(target: "utcp_mcp", tool = %tool_name, server = %server.name, error = %error, "MCP call failed, trying next server");
                    failures.push(format!("{}: {error}", server.name));
                }
            }
        }
        Err(UtcpError::transport(format!("{ALL_SERVERS_FAILED} ({})", failures.join("; "))))
    }

    async fn call_tool_streaming(
        &self,
        context: &ProtocolContext,
        tool_name: &str,
        arguments: &ToolArguments,
        tool_call_template: &CallTemplate,
        cancel: &CancellationToken,
    ) -> Result<ToolStream, UtcpError> {
        let template = mcp_template(tool_call_template)?;
        if template.configured_servers().is_some() {
            let servers = resolve_servers(template)?;
            if let Some((server, url)) = servers.iter().find_map(|server| server.config.url.as_deref().map(|url| (server, url))) {
                let server_tool_name = server_tool_name(&template.name, tool_name);
                match self.open_stream(template, server, url, server_tool_name, arguments, cancel).await {
                    Ok(stream) => return Ok(stream),
                    Err(error @ UtcpError::Cancelled { .. }) => return Err(error),
                    Err(error) => {
                        debug!(target: "utcp_mcp", tool = %tool_name, server = %server.name, error = %error, "MCP stream unavailable, falling back to a single call");
                    }
                }
            }
        }

        let value = self.call_tool(context, tool_name, arguments, tool_call_template, cancel).await?;
        Ok(ToolStream::once(Ok(value)))
    }
}

fn mcp_template(template: &CallTemplate) -> Result<&McpCallTemplate, UtcpError> {
    match template {
        CallTemplate::Mcp(template) => Ok(template),
        other => Err(UtcpError::invalid_configuration(format!(
            "MCP protocol cannot use a '{}' call template",
            other.call_template_type()
        ))),
    }
}

/// Resolves the servers a template addresses; multi-server mode wins over legacy fields.
fn resolve_servers(template: &McpCallTemplate) -> Result<Vec<NamedServer>, UtcpError> {
    if let Some(servers) = template.configured_servers() {
        return Ok(servers
            .iter()
            .map(|(name, config)| NamedServer {
                name: name.clone(),
                config: config.clone(),
            })
            .collect());
    }

    let config = match template.transport {
        McpTransport::Http => {
            let url = template
                .url
                .clone()
                .filter(|url| !url.trim().is_empty())
                .ok_or_else(|| UtcpError::invalid_configuration("URL is required for HTTP transport"))?;
            McpServerConfig {
                url: Some(url),
                ..McpServerConfig::default()
            }
        }
        McpTransport::Stdio => {
            let command_line = template
                .command
                .as_deref()
                .filter(|command| !command.trim().is_empty())
                .ok_or_else(|| UtcpError::invalid_configuration("Command is required for stdio transport"))?;
            let mut parts = command_line.split_whitespace().map(str::to_string);
            McpServerConfig {
                command: parts.next(),
                args: parts.collect(),
                ..McpServerConfig::default()
            }
        }
    };
    Ok(vec![NamedServer {
        name: template.name.clone(),
        config,
    }])
}

/// Strips the `<manual>.` prefix the client adds to discovered tool names.
fn server_tool_name<'a>(manual_name: &str, tool_name: &'a str) -> &'a str {
    tool_name
        .strip_prefix(manual_name)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(tool_name)
}

/// Reads `{tools: [...]}` (also inside a JSON-RPC `result`, or a bare array).
///
/// Entries are `{name, description?, inputSchema?, outputSchema?}` objects or
/// bare name strings; blank names are skipped. A payload that is not JSON or
/// carries no tool list is a transport failure for that server.
fn parse_listed_tools(server_name: &str, payload: &str, template: &McpCallTemplate) -> Result<Vec<Tool>, UtcpError> {
    let document: Value = serde_json::from_str(payload.trim()).map_err(|error| {
        UtcpError::transport(format!("MCP server '{server_name}' returned an invalid tool listing: {error}"))
    })?;
    let entries = document
        .get("tools")
        .or_else(|| document.get("result").and_then(|result| result.get("tools")))
        .and_then(Value::as_array)
        .or_else(|| document.as_array())
        .ok_or_else(|| UtcpError::transport(format!("MCP server '{server_name}' returned no tools array")))?;

    let call_template = CallTemplate::Mcp(template.clone());
    Ok(entries
        .iter()
        .filter_map(|entry| {
            let (name, description, inputs, outputs) = match entry {
                Value::String(name) => (name.as_str(), "", None, None),
                Value::Object(fields) => (
                    fields.get("name").and_then(Value::as_str)?,
                    fields.get("description").and_then(Value::as_str).unwrap_or_default(),
                    fields.get("inputSchema").or_else(|| fields.get("inputs")),
                    fields.get("outputSchema").or_else(|| fields.get("outputs")),
                ),
                _ => return None,
            };
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let mut tool = Tool::new(name, description, call_template.clone());
            if let Some(schema) = inputs.filter(|schema| schema.is_object()) {
                tool.inputs = JsonSchema::from_value_lossy(schema);
            }
            if let Some(schema) = outputs.filter(|schema| schema.is_object()) {
                tool.outputs = JsonSchema::from_value_lossy(schema);
            }
            Some(tool)
        })
        .collect())
}

/// Decodes a call response, surfacing JSON-RPC errors before normalization.
fn decode_call_response(server_name: &str, raw: &str) -> Result<Value, UtcpError> {
    let Some(decoded) = deserialize_to_closest(raw) else {
        return Ok(Value::Null);
    };
    if let Some(error) = decoded.get("error").filter(|error| !error.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(UtcpError::transport(format!("MCP server '{server_name}' returned an error: {message}")));
    }
    Ok(process_tool_result(decoded))
}

fn decode_event(server_name: &str, event: SseEvent) -> Option<ToolChunk> {
    match decode_call_response(server_name, &event.data) {
        Ok(Value::Null) => None,
        other => Some(other),
    }
}
