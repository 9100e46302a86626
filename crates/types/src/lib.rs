//! Shared model types for the UTCP workspace.
//!
//! - [`Auth`] and [`CallTemplate`]: discriminated unions decoded through the [`PolymorphicRegistry`].
//! - [`Tool`], [`Manual`], [`RegisterManualResult`]: the manual document model.
//! - [`CommunicationProtocol`] and [`ToolStream`]: the adapter contract.
//! - [`UtcpError`]: the error taxonomy every crate reports through.

pub mod auth;
pub mod call_template;
pub mod error;
pub mod manual;
pub mod polymorphic;
pub mod protocol;
pub mod stream;
pub mod tool;

pub use auth::{AUTH_TYPE_FIELD, ApiKeyAuth, ApiKeyLocation, Auth, BasicAuth, CustomAuth, OAuth2Auth};
pub use call_template::{
    CALL_TEMPLATE_TYPE_FIELD, CallTemplate, CliCallTemplate, CustomCallTemplate, GraphQlCallTemplate, GrpcCallTemplate,
    HttpCallTemplate, McpCallTemplate, McpServerConfig, McpServersConfig, McpTransport, SocketCallTemplate,
    StreamableHttpCallTemplate, TextCallTemplate,
};
pub use error::{SerializerValidationError, UtcpError};
pub use manual::{DEFAULT_MANUAL_VERSION, Manual, RegisterManualResult};
pub use polymorphic::{AuthConstructor, CallTemplateConstructor, PolymorphicRegistry};
pub use protocol::{CommunicationProtocol, ProtocolContext, ToolArguments};
pub use stream::{ToolChunk, ToolStream, ToolStreamSender};
pub use tool::{JsonSchema, Tool};
