//! The client façade.
//!
//! Registration flows template → protocol → manual → repository; invocation
//! flows tool name → repository → template → protocol → post-processors.
//! Templates are substituted right before they reach a protocol, using the
//! owning manual's name as the variable namespace.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexSet;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utcp_registry::{InMemToolRepository, TagAndDescriptionWordMatchStrategy, ToolRepository, ToolSearchStrategy};
use utcp_types::{CallTemplate, PolymorphicRegistry, ProtocolContext, RegisterManualResult, Tool, ToolArguments, ToolStream, UtcpError};
use utcp_util::{SubstitutionConfig, VariableLoader, VariableSubstitutor};

use crate::config::UtcpClientConfig;
use crate::post_processing::ToolPostProcessor;
use crate::protocol_registry::ProtocolRegistry;

/// Assembles a [`UtcpClient`] from its collaborators.
///
/// Anything not supplied falls back to the in-memory repository, the
/// tag/description search strategy and the built-in protocols.
pub struct UtcpClientBuilder {
    root_dir: PathBuf,
    config: UtcpClientConfig,
    repository: Option<Arc<dyn ToolRepository>>,
    search_strategy: Option<Arc<dyn ToolSearchStrategy>>,
    protocols: Option<ProtocolRegistry>,
    extra_loaders: Vec<Arc<dyn VariableLoader>>,
    extra_post_processors: Vec<Arc<dyn ToolPostProcessor>>,
}

impl UtcpClientBuilder {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            config: UtcpClientConfig::default(),
            repository: None,
            search_strategy: None,
            protocols: None,
            extra_loaders: Vec::new(),
            extra_post_processors: Vec::new(),
        }
    }

    pub fn config(mut self, config: UtcpClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn repository(mut self, repository: Arc<dyn ToolRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn search_strategy(mut self, search_strategy: Arc<dyn ToolSearchStrategy>) -> Self {
        self.search_strategy = Some(search_strategy);
        self
    }

    pub fn protocols(mut self, protocols: ProtocolRegistry) -> Self {
        self.protocols = Some(protocols);
        self
    }

    /// Adds a loader consulted after the ones listed in the config.
    pub fn variable_loader(mut self, loader: Arc<dyn VariableLoader>) -> Self {
        self.extra_loaders.push(loader);
        self
    }

    /// Adds a post-processor that runs after the configured ones.
    pub fn post_processor(mut self, post_processor: Arc<dyn ToolPostProcessor>) -> Self {
        self.extra_post_processors.push(post_processor);
        self
    }

    /// Builds the client and registers every manual listed in the config.
    ///
    /// Registrations that fail are logged; errors that registration raises
    /// (a missing protocol, an unresolved variable, cancellation) are returned.
    pub async fn build(self, cancel: &CancellationToken) -> Result<UtcpClient, UtcpError> {
        let mut substitution = self.config.substitution_config(&self.root_dir)?;
        substitution.loaders.extend(self.extra_loaders);

        let mut post_processors = self.config.post_processors();
        post_processors.extend(self.extra_post_processors);

        let client = UtcpClient {
            context: ProtocolContext::new(&self.root_dir),
            root_dir: self.root_dir,
            substitution,
            substitutor: VariableSubstitutor::new(),
            repository: self.repository.unwrap_or_else(|| Arc::new(InMemToolRepository::new())),
            search_strategy: self
                .search_strategy
                .unwrap_or_else(|| Arc::new(TagAndDescriptionWordMatchStrategy::default())),
            protocols: self.protocols.unwrap_or_else(ProtocolRegistry::with_builtins),
            post_processors,
        };

        let templates = self.config.manual_call_templates;
        if !templates.is_empty() {
            for result in client.register_manuals(templates, cancel).await? {
                if !result.success {
                    warn!(
                        target: "utcp_client",
                        manual = %result.manual_call_template.name(),
                        errors = ?result.errors,
                        "configured manual did not register cleanly"
                    );
                }
            }
        }
        Ok(client)
    }
}

/// Discovers, searches and calls tools across every registered manual.
pub struct UtcpClient {
    root_dir: PathBuf,
    context: ProtocolContext,
    substitution: SubstitutionConfig,
    substitutor: VariableSubstitutor,
    repository: Arc<dyn ToolRepository>,
    search_strategy: Arc<dyn ToolSearchStrategy>,
    protocols: ProtocolRegistry,
    post_processors: Vec<Arc<dyn ToolPostProcessor>>,
}

impl fmt::Debug for UtcpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtcpClient")
            .field("root_dir", &self.root_dir)
            .field("protocols", &self.protocols)
            .field("post_processors", &self.post_processors)
            .finish_non_exhaustive()
    }
}

impl UtcpClient {
    /// Shorthand for [`UtcpClientBuilder`] with a config and default collaborators.
    pub async fn create(root_dir: impl Into<PathBuf>, config: UtcpClientConfig, cancel: &CancellationToken) -> Result<Self, UtcpError> {
        UtcpClientBuilder::new(root_dir).config(config).build(cancel).await
    }

    pub fn builder(root_dir: impl Into<PathBuf>) -> UtcpClientBuilder {
        UtcpClientBuilder::new(root_dir)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn repository(&self) -> &Arc<dyn ToolRepository> {
        &self.repository
    }

    pub fn protocols(&self) -> &ProtocolRegistry {
        &self.protocols
    }

    /// Discovers the manual behind `manual_call_template` and stores its tools.
    ///
    /// Discovery failures come back as a result with `success == false`.
    /// A missing protocol, an unresolved variable or cancellation is raised.
    pub async fn register_manual(
        &self,
        manual_call_template: CallTemplate,
        cancel: &CancellationToken,
    ) -> Result<RegisterManualResult, UtcpError> {
        let manual_name = manual_call_template.name().to_string();
        let protocol = self.protocols.resolve(manual_call_template.call_template_type())?;
        let template = self.substitute_template(&manual_call_template, &manual_name)?;

        let mut result = match protocol.register_manual(&self.context, &template, cancel).await {
            Ok(result) => result,
            Err(error @ UtcpError::Cancelled { .. }) => return Err(error),
            Err(error) => {
                warn!(target: "utcp_client", manual = %manual_name, error = %error, "manual registration failed");
                return Ok(RegisterManualResult::failed(manual_call_template, error.to_string()));
            }
        };

        // Stored templates stay unsubstituted; calls resolve them once per dispatch.
        for tool in &mut result.manual.tools {
            tool.name = prefixed_tool_name(&manual_name, &tool.name);
            restore_unsubstituted(&mut tool.tool_call_template, &template, &manual_call_template);
        }
        result.manual_call_template = manual_call_template;
        if result.success || !result.manual.tools.is_empty() {
            self.repository
                .save_manual(result.manual_call_template.clone(), result.manual.clone())
                .await?;
        }
        info!(
            target: "utcp_client",
            manual = %manual_name,
            tools = result.manual.tools.len(),
            success = result.success,
            "registered manual"
        );
        Ok(result)
    }

    /// Registers templates one after another, returning one result per template.
    ///
    /// Raised errors other than cancellation are folded into a failed result
    /// so one bad template does not stop the rest.
    pub async fn register_manuals(
        &self,
        manual_call_templates: Vec<CallTemplate>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RegisterManualResult>, UtcpError> {
        let mut results = Vec::with_capacity(manual_call_templates.len());
        for template in manual_call_templates {
            let result = match self.register_manual(template.clone(), cancel).await {
                Ok(result) => result,
                Err(error @ UtcpError::Cancelled { .. }) => return Err(error),
                Err(error) => RegisterManualResult::failed(template, error.to_string()),
            };
            results.push(result);
        }
        Ok(results)
    }

    /// Removes a manual and its tools. Returns false when it was not registered.
    pub async fn deregister_manual(&self, manual_name: &str, cancel: &CancellationToken) -> Result<bool, UtcpError> {
        let Some(template) = self.repository.get_manual_call_template(manual_name).await? else {
            return Ok(false);
        };
        match self.protocols.resolve(template.call_template_type()) {
            Ok(protocol) => {
                if let Err(error) = protocol.deregister_manual(&self.context, &template, cancel).await {
                    warn!(target: "utcp_client", manual = %manual_name, error = %error, "protocol failed to release manual");
                }
            }
            Err(error) => debug!(target: "utcp_client", manual = %manual_name, error = %error, "no protocol to notify"),
        }
        let removed = self.repository.remove_manual(manual_name).await?;
        debug!(target: "utcp_client", manual = %manual_name, removed, "deregistered manual");
        Ok(removed)
    }

    /// Ranks registered tools against `query`; `limit == 0` returns every match.
    pub async fn search_tools(&self, query: &str, limit: usize, any_of_tags_required: Option<&[String]>) -> Result<Vec<Tool>, UtcpError> {
        self.search_strategy
            .search_tools(self.repository.as_ref(), query, limit, any_of_tags_required)
            .await
    }

    /// Calls a registered tool and runs the result through the post-processors.
    pub async fn call_tool(&self, tool_name: &str, arguments: ToolArguments, cancel: &CancellationToken) -> Result<Value, UtcpError> {
        let (tool, template) = self.prepare_call(tool_name).await?;
        let protocol = self.protocols.resolve(template.call_template_type())?;
        debug!(target: "utcp_client", tool = %tool.name, call_template_type = %template.call_template_type(), "calling tool");

        let result = protocol.call_tool(&self.context, &tool.name, &arguments, &template, cancel).await?;
        Ok(self
            .post_processors
            .iter()
            .fold(result, |value, processor| processor.post_process(&tool, value)))
    }

    /// Calls a registered tool and streams its results. Post-processors are not applied.
    pub async fn call_tool_streaming(
        &self,
        tool_name: &str,
        arguments: ToolArguments,
        cancel: &CancellationToken,
    ) -> Result<ToolStream, UtcpError> {
        let (tool, template) = self.prepare_call(tool_name).await?;
        let protocol = self.protocols.resolve(template.call_template_type())?;
        debug!(target: "utcp_client", tool = %tool.name, call_template_type = %template.call_template_type(), "streaming tool");
        protocol
            .call_tool_streaming(&self.context, &tool.name, &arguments, &template, cancel)
            .await
    }

    /// Namespaced variables a manual template references.
    pub fn get_required_variables_for_manual_and_tools(&self, manual_call_template: &CallTemplate) -> Result<IndexSet<String>, UtcpError> {
        let value = template_value(manual_call_template)?;
        Ok(self
            .substitutor
            .find_required_variables(&value, Some(manual_call_template.name())))
    }

    /// Namespaced variables a registered tool's template references.
    pub async fn get_required_variables_for_registered_tool(&self, tool_name: &str) -> Result<IndexSet<String>, UtcpError> {
        let tool = self
            .repository
            .get_tool(tool_name)
            .await?
            .ok_or_else(|| UtcpError::tool_not_found(tool_name))?;
        let manual_name = self.owning_manual(&tool).await?;
        let value = template_value(&tool.tool_call_template)?;
        Ok(self.substitutor.find_required_variables(&value, Some(&manual_name)))
    }

    async fn prepare_call(&self, tool_name: &str) -> Result<(Tool, CallTemplate), UtcpError> {
        let tool = self
            .repository
            .get_tool(tool_name)
            .await?
            .ok_or_else(|| UtcpError::tool_not_found(tool_name))?;
        let manual_name = self.owning_manual(&tool).await?;
        let template = self.substitute_template(&tool.tool_call_template, &manual_name)?;
        Ok((tool, template))
    }

    async fn owning_manual(&self, tool: &Tool) -> Result<String, UtcpError> {
        Ok(self
            .repository
            .get_manual_name_for_tool(&tool.name)
            .await?
            .unwrap_or_else(|| tool.name.split('.').next().unwrap_or_default().to_string()))
    }

    fn substitute_template(&self, template: &CallTemplate, namespace: &str) -> Result<CallTemplate, UtcpError> {
        let value = template_value(template)?;
        let substituted = self.substitutor.substitute(&value, &self.substitution, Some(namespace))?;
        Ok(PolymorphicRegistry::global().decode_call_template(substituted)?)
    }
}

fn template_value(template: &CallTemplate) -> Result<Value, UtcpError> {
    template
        .to_value()
        .map_err(|error| UtcpError::invalid_configuration(format!("call template '{}' cannot be encoded: {error}", template.name())))
}

/// Swaps values a protocol copied from the substituted manual template back
/// to their unsubstituted form: the whole template, or just its auth.
fn restore_unsubstituted(tool_template: &mut CallTemplate, substituted: &CallTemplate, original: &CallTemplate) {
    if tool_template == substituted {
        *tool_template = original.clone();
        return;
    }
    if substituted.auth().is_some() && tool_template.auth() == substituted.auth() {
        *tool_template.auth_mut() = original.auth().cloned();
    }
}

/// `<manual>.<tool>`, unless the protocol already returned it that way.
fn prefixed_tool_name(manual_name: &str, tool_name: &str) -> String {
    match tool_name.strip_prefix(manual_name) {
        Some(rest) if rest.starts_with('.') => tool_name.to_string(),
        _ => format!("{manual_name}.{tool_name}"),
    }
}
