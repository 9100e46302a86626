//! Model Context Protocol (MCP) adapter for UTCP.
//!
//! [`McpProtocol`] discovers and calls tools on one or many MCP backends,
//! spawned as local processes or reached over HTTP. Responses are normalized
//! by [`process_tool_result`], and OAuth2 client-credential tokens are cached
//! in an [`OAuthTokenCache`] shared across calls.

mod http;
mod normalize;
mod oauth;
mod protocol;
mod stdio;

pub use normalize::{normalize_tool_response, process_tool_result};
pub use oauth::{OAuthTokenCache, authorize_request};
pub use protocol::{MCP_CALL_TEMPLATE_TYPE, McpProtocol};
