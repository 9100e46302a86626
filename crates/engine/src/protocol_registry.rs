//! Discriminator → protocol adapter lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;
use utcp_mcp::{MCP_CALL_TEMPLATE_TYPE, McpProtocol, OAuthTokenCache};
use utcp_types::{CommunicationProtocol, UtcpError};

use crate::protocols::{CliProtocol, HttpProtocol, TextProtocol};

/// Protocol adapters keyed by lowercase `call_template_type`.
///
/// Cloning shares the underlying table.
#[derive(Clone, Default)]
pub struct ProtocolRegistry {
    protocols: Arc<RwLock<HashMap<String, Arc<dyn CommunicationProtocol>>>>,
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistry").field("types", &self.types()).finish()
    }
}

impl ProtocolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the bundled adapters: `http`, `streamable_http`, `text`, `cli` and `mcp`.
    ///
    /// The HTTP and MCP adapters share one OAuth2 token cache.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        let tokens = Arc::new(OAuthTokenCache::new());
        let http: Arc<dyn CommunicationProtocol> = Arc::new(HttpProtocol::new().with_token_cache(Arc::clone(&tokens)));
        registry.register("http", Arc::clone(&http), false);
        registry.register("streamable_http", http, false);
        registry.register("text", Arc::new(TextProtocol::new()), false);
        registry.register("cli", Arc::new(CliProtocol::new()), false);
        registry.register(MCP_CALL_TEMPLATE_TYPE, Arc::new(McpProtocol::new().with_token_cache(tokens)), false);
        registry
    }

    /// Registers `protocol` for `call_template_type`.
    ///
    /// Returns false, leaving the existing entry in place, when the type is
    /// already registered and `override_existing` is false.
    pub fn register(&self, call_template_type: &str, protocol: Arc<dyn CommunicationProtocol>, override_existing: bool) -> bool {
        let key = call_template_type.trim().to_ascii_lowercase();
        let mut protocols = self.protocols.write().unwrap_or_else(PoisonError::into_inner);
        if !override_existing && protocols.contains_key(&key) {
            debug!(target: "utcp_client", call_template_type = %key, "protocol already registered, keeping existing");
            return false;
        }
        protocols.insert(key, protocol);
        true
    }

    /// Looks up the protocol for a discriminator, case-insensitively.
    pub fn resolve(&self, call_template_type: &str) -> Result<Arc<dyn CommunicationProtocol>, UtcpError> {
        self.protocols
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&call_template_type.trim().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| UtcpError::protocol_not_registered(call_template_type))
    }

    pub fn contains(&self, call_template_type: &str) -> bool {
        self.resolve(call_template_type).is_ok()
    }

    /// Registered discriminators, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.protocols.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect();
        types.sort();
        types
    }
}
