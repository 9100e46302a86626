//! # UTCP Engine
//!
//! Ties the workspace together behind [`UtcpClient`]: a manual call template
//! is dispatched through the [`ProtocolRegistry`] to its adapter, the
//! discovered tools land in a [`utcp_registry::ToolRepository`], and calls are
//! routed back to the adapter that owns the tool's call template.
//!
//! ## Usage
//!
//! ```no_run
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//! use utcp_engine::{UtcpClient, UtcpClientConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = UtcpClientConfig::from_json_str(
//!     r#"{"manual_call_templates": [{"call_template_type": "http", "name": "weather", "url": "http://localhost:8080/utcp"}]}"#,
//! )?;
//! let cancel = CancellationToken::new();
//! let client = UtcpClient::create(".", config, &cancel).await?;
//!
//! let tools = client.search_tools("current weather", 5, None).await?;
//! if let Some(tool) = tools.first() {
//!     let arguments = json!({"city": "Paris"}).as_object().cloned().unwrap_or_default();
//!     println!("{}", client.call_tool(&tool.name, arguments, &cancel).await?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **`client`**: the façade and its builder
//! - **`config`**: JSON/YAML client configuration
//! - **`protocol_registry`**: discriminator → adapter lookup
//! - **`protocols`**: the bundled `http`, `streamable_http`, `text` and `cli` adapters
//! - **`post_processing`**: result transformations

pub mod client;
pub mod config;
pub mod post_processing;
pub mod protocol_registry;
pub mod protocols;

pub use client::{UtcpClient, UtcpClientBuilder};
pub use config::{ConfigError, PostProcessorConfig, UtcpClientConfig, VariableLoaderConfig};
pub use post_processing::{FilterDictPostProcessor, ToolPostProcessor};
pub use protocol_registry::ProtocolRegistry;
pub use protocols::{CliProtocol, HttpProtocol, TextProtocol};
