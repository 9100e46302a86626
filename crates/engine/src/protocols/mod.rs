//! Built-in transport adapters registered by [`crate::ProtocolRegistry::with_builtins`].

mod cli;
mod http;
mod text;

pub use cli::CliProtocol;
pub use http::HttpProtocol;
pub use text::TextProtocol;
