//! Call templates: the executable identity of a manual source or a tool.
//!
//! `CallTemplate` is a discriminated union keyed by `call_template_type`. Each
//! built-in variant owns a plain struct with its transport-specific fields;
//! variants registered at runtime land in [`CallTemplate::Custom`] with their
//! fields preserved verbatim.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map as JsonMap, Value};

use crate::auth::Auth;
use crate::polymorphic::{PolymorphicRegistry, with_discriminator};

/// Wire field that selects the `CallTemplate` variant.
pub const CALL_TEMPLATE_TYPE_FIELD: &str = "call_template_type";

fn default_http_method() -> String {
    "GET".to_string()
}

fn default_stream_content_type() -> String {
    "text/event-stream".to_string()
}

fn default_true() -> bool {
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Plain request/response HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpCallTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    #[serde(default = "default_http_method")]
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Request timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// HTTP endpoint whose response is a server-sent-event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamableHttpCallTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    #[serde(default = "default_http_method")]
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Request timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default = "default_stream_content_type")]
    pub content_type: String,
}

/// A local command line invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliCallTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "working_directory")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty", alias = "environment")]
    pub env: IndexMap<String, String>,
    /// Process timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlCallTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    #[serde(alias = "endpoint")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrpcCallTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    pub host: String,
    pub port: u16,
    pub service_name: String,
    pub method_name: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub use_ssl: bool,
}

/// Raw socket endpoint, shared by the `tcp` and `udp` variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketCallTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    pub host: String,
    pub port: u16,
    /// Read timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// A file on disk, read whole or in chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCallTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_name: Option<String>,
    /// Zero reads the whole file.
    #[serde(default)]
    pub chunk_size_bytes: usize,
    #[serde(default = "default_true")]
    pub ensure_under_root: bool,
}

/// Transport used by a single-server MCP template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    #[default]
    Stdio,
    Http,
}

/// One named MCP backend: either an HTTP endpoint or a command to spawn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sse_read_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminate_on_close: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
}

/// `{"mcpServers": {...}}` block accepted in place of `servers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServersConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: IndexMap<String, McpServerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpCallTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub transport: McpTransport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servers: Option<IndexMap<String, McpServerConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<McpServersConfig>,
}

impl McpCallTemplate {
    /// Named servers for multi-server mode, or `None` for legacy single-transport mode.
    ///
    /// `servers` wins over `config.mcpServers`; an empty map counts as absent.
    pub fn configured_servers(&self) -> Option<&IndexMap<String, McpServerConfig>> {
        self.servers
            .as_ref()
            .filter(|servers| !servers.is_empty())
            .or_else(|| self.config.as_ref().map(|config| &config.mcp_servers).filter(|servers| !servers.is_empty()))
    }
}

/// A call template whose discriminator was registered at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCallTemplate {
    pub call_template_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    #[serde(flatten)]
    pub fields: JsonMap<String, Value>,
}

/// How to reach a manual source or a single tool.
#[derive(Debug, Clone, PartialEq)]
pub enum CallTemplate {
    Http(HttpCallTemplate),
    StreamableHttp(StreamableHttpCallTemplate),
    Cli(CliCallTemplate),
    GraphQl(GraphQlCallTemplate),
    Grpc(GrpcCallTemplate),
    Tcp(SocketCallTemplate),
    Udp(SocketCallTemplate),
    Text(TextCallTemplate),
    Mcp(McpCallTemplate),
    Custom(CustomCallTemplate),
}

impl CallTemplate {
    /// The wire discriminator for this variant.
    pub fn call_template_type(&self) -> &str {
        match self {
            CallTemplate::Http(_) => "http",
            CallTemplate::StreamableHttp(_) => "streamable_http",
            CallTemplate::Cli(_) => "cli",
            CallTemplate::GraphQl(_) => "graphql",
            CallTemplate::Grpc(_) => "grpc",
            CallTemplate::Tcp(_) => "tcp",
            CallTemplate::Udp(_) => "udp",
            CallTemplate::Text(_) => "text",
            CallTemplate::Mcp(_) => "mcp",
            CallTemplate::Custom(custom) => &custom.call_template_type,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CallTemplate::Http(template) => &template.name,
            CallTemplate::StreamableHttp(template) => &template.name,
            CallTemplate::Cli(template) => &template.name,
            CallTemplate::GraphQl(template) => &template.name,
            CallTemplate::Grpc(template) => &template.name,
            CallTemplate::Tcp(template) | CallTemplate::Udp(template) => &template.name,
            CallTemplate::Text(template) => &template.name,
            CallTemplate::Mcp(template) => &template.name,
            CallTemplate::Custom(template) => &template.name,
        }
    }

    pub fn auth(&self) -> Option<&Auth> {
        match self {
            CallTemplate::Http(template) => template.auth.as_ref(),
            CallTemplate::StreamableHttp(template) => template.auth.as_ref(),
            CallTemplate::Cli(template) => template.auth.as_ref(),
            CallTemplate::GraphQl(template) => template.auth.as_ref(),
            CallTemplate::Grpc(template) => template.auth.as_ref(),
            CallTemplate::Tcp(template) | CallTemplate::Udp(template) => template.auth.as_ref(),
            CallTemplate::Text(template) => template.auth.as_ref(),
            CallTemplate::Mcp(template) => template.auth.as_ref(),
            CallTemplate::Custom(template) => template.auth.as_ref(),
        }
    }

    pub fn auth_mut(&mut self) -> &mut Option<Auth> {
        match self {
            CallTemplate::Http(template) => &mut template.auth,
            CallTemplate::StreamableHttp(template) => &mut template.auth,
            CallTemplate::Cli(template) => &mut template.auth,
            CallTemplate::GraphQl(template) => &mut template.auth,
            CallTemplate::Grpc(template) => &mut template.auth,
            CallTemplate::Tcp(template) | CallTemplate::Udp(template) => &mut template.auth,
            CallTemplate::Text(template) => &mut template.auth,
            CallTemplate::Mcp(template) => &mut template.auth,
            CallTemplate::Custom(template) => &mut template.auth,
        }
    }

    /// Encode this template as a JSON value, discriminator included.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl Serialize for CallTemplate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = match self {
            CallTemplate::Http(template) => serde_json::to_value(template),
            CallTemplate::StreamableHttp(template) => serde_json::to_value(template),
            CallTemplate::Cli(template) => serde_json::to_value(template),
            CallTemplate::GraphQl(template) => serde_json::to_value(template),
            CallTemplate::Grpc(template) => serde_json::to_value(template),
            CallTemplate::Tcp(template) | CallTemplate::Udp(template) => serde_json::to_value(template),
            CallTemplate::Text(template) => serde_json::to_value(template),
            CallTemplate::Mcp(template) => serde_json::to_value(template),
            CallTemplate::Custom(template) => return template.serialize(serializer),
        }
        .map_err(S::Error::custom)?;
        with_discriminator(body, CALL_TEMPLATE_TYPE_FIELD, self.call_template_type()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CallTemplate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        PolymorphicRegistry::global()
            .decode_call_template(value)
            .map_err(D::Error::custom)
    }
}
