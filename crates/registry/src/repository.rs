//! Concurrent tool repository.
//!
//! The in-memory implementation keeps every index inside one immutable
//! snapshot behind an `Arc`. Readers clone the current `Arc` and work on it
//! without holding any lock; writers serialize on an async mutex, build the
//! next snapshot and swap it in. A reader therefore sees either the state
//! before or after a save/remove, never a mix of both.

use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::debug;
use utcp_types::{CallTemplate, Manual, Tool, UtcpError};

/// Store of manuals, their call templates and the tools they own.
#[async_trait::async_trait]
pub trait ToolRepository: Send + Sync {
    /// Replaces the manual registered under `manual_call_template.name()` and indexes its tools.
    async fn save_manual(&self, manual_call_template: CallTemplate, manual: Manual) -> Result<(), UtcpError>;

    /// Removes a manual, its call template and every tool it owns. Returns false when absent.
    async fn remove_manual(&self, manual_name: &str) -> Result<bool, UtcpError>;

    /// Removes one tool from the index and from its owning manual. Returns false when absent.
    async fn remove_tool(&self, tool_name: &str) -> Result<bool, UtcpError>;

    async fn get_tool(&self, tool_name: &str) -> Result<Option<Tool>, UtcpError>;

    /// Every indexed tool in insertion order.
    async fn get_tools(&self) -> Result<Vec<Tool>, UtcpError>;

    /// Tools of one manual; `None` when the manual is not registered.
    async fn get_tools_by_manual(&self, manual_name: &str) -> Result<Option<Vec<Tool>>, UtcpError>;

    async fn get_manual(&self, manual_name: &str) -> Result<Option<Manual>, UtcpError>;

    async fn get_manuals(&self) -> Result<Vec<Manual>, UtcpError>;

    async fn get_manual_names(&self) -> Result<Vec<String>, UtcpError>;

    async fn get_manual_call_template(&self, manual_name: &str) -> Result<Option<CallTemplate>, UtcpError>;

    async fn get_manual_call_templates(&self) -> Result<Vec<CallTemplate>, UtcpError>;

    /// Name of the manual that currently owns `tool_name`.
    async fn get_manual_name_for_tool(&self, tool_name: &str) -> Result<Option<String>, UtcpError>;
}

#[derive(Debug, Clone, Default)]
struct RepositorySnapshot {
    tools: IndexMap<String, Tool>,
    tool_owners: IndexMap<String, String>,
    manuals: IndexMap<String, Manual>,
    manual_call_templates: IndexMap<String, CallTemplate>,
}

impl RepositorySnapshot {
    /// Drops every index entry still owned by `manual_name`.
    fn detach_manual_tools(&mut self, manual_name: &str) {
        let Some(manual) = self.manuals.get(manual_name) else {
            return;
        };
        let owned: Vec<String> = manual
            .tools
            .iter()
            .map(|tool| tool.name.clone())
            .filter(|tool_name| self.tool_owners.get(tool_name).is_some_and(|owner| owner == manual_name))
            .collect();
        for tool_name in owned {
            self.tools.shift_remove(&tool_name);
            self.tool_owners.shift_remove(&tool_name);
        }
    }

    /// Removes `tool_name` from the tool list of whichever manual owns it.
    fn disown_tool(&mut self, tool_name: &str) {
        if let Some(owner) = self.tool_owners.shift_remove(tool_name)
            && let Some(manual) = self.manuals.get_mut(&owner)
        {
            manual.tools.retain(|tool| tool.name != tool_name);
        }
    }
}

/// In-memory [`ToolRepository`].
#[derive(Debug, Default)]
pub struct InMemToolRepository {
    snapshot: RwLock<Arc<RepositorySnapshot>>,
    write_lock: Mutex<()>,
}

impl InMemToolRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Arc<RepositorySnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, next: RepositorySnapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }
}

#[async_trait::async_trait]
impl ToolRepository for InMemToolRepository {
    async fn save_manual(&self, manual_call_template: CallTemplate, manual: Manual) -> Result<(), UtcpError> {
        let _writer = self.write_lock.lock().await;
        let mut next = RepositorySnapshot::clone(&self.current());
        let manual_name = manual_call_template.name().to_string();

        next.detach_manual_tools(&manual_name);

        let mut indexed_tools: IndexMap<String, Tool> = IndexMap::new();
        for tool in &manual.tools {
            indexed_tools.insert(tool.name.clone(), tool.clone());
        }
        for tool_name in indexed_tools.keys() {
            if next.tool_owners.get(tool_name).is_some_and(|owner| owner != &manual_name) {
                next.disown_tool(tool_name);
            }
        }
        for (tool_name, tool) in indexed_tools {
            next.tools.insert(tool_name.clone(), tool);
            next.tool_owners.insert(tool_name, manual_name.clone());
        }

        debug!(target: "utcp_repository", manual = %manual_name, tools = manual.tools.len(), "saved manual");
        next.manual_call_templates.insert(manual_name.clone(), manual_call_template);
        next.manuals.insert(manual_name, manual);
        self.publish(next);
        Ok(())
    }

    async fn remove_manual(&self, manual_name: &str) -> Result<bool, UtcpError> {
        let _writer = self.write_lock.lock().await;
        let current = self.current();
        if !current.manuals.contains_key(manual_name) {
            return Ok(false);
        }

        let mut next = RepositorySnapshot::clone(&current);
        next.detach_manual_tools(manual_name);
        next.manuals.shift_remove(manual_name);
        next.manual_call_templates.shift_remove(manual_name);
        self.publish(next);
        debug!(target: "utcp_repository", manual = %manual_name, "removed manual");
        Ok(true)
    }

    async fn remove_tool(&self, tool_name: &str) -> Result<bool, UtcpError> {
        let _writer = self.write_lock.lock().await;
        let current = self.current();
        if !current.tools.contains_key(tool_name) {
            return Ok(false);
        }

        let mut next = RepositorySnapshot::clone(&current);
        next.tools.shift_remove(tool_name);
        next.disown_tool(tool_name);
        self.publish(next);
        debug!(target: "utcp_repository", tool = %tool_name, "removed tool");
        Ok(true)
    }

    async fn get_tool(&self, tool_name: &str) -> Result<Option<Tool>, UtcpError> {
        Ok(self.current().tools.get(tool_name).cloned())
    }

    async fn get_tools(&self) -> Result<Vec<Tool>, UtcpError> {
        Ok(self.current().tools.values().cloned().collect())
    }

    async fn get_tools_by_manual(&self, manual_name: &str) -> Result<Option<Vec<Tool>>, UtcpError> {
        Ok(self.current().manuals.get(manual_name).map(|manual| manual.tools.clone()))
    }

    async fn get_manual(&self, manual_name: &str) -> Result<Option<Manual>, UtcpError> {
        Ok(self.current().manuals.get(manual_name).cloned())
    }

    async fn get_manuals(&self) -> Result<Vec<Manual>, UtcpError> {
        Ok(self.current().manuals.values().cloned().collect())
    }

    async fn get_manual_names(&self) -> Result<Vec<String>, UtcpError> {
        Ok(self.current().manuals.keys().cloned().collect())
    }

    async fn get_manual_call_template(&self, manual_name: &str) -> Result<Option<CallTemplate>, UtcpError> {
        Ok(self.current().manual_call_templates.get(manual_name).cloned())
    }

    async fn get_manual_call_templates(&self) -> Result<Vec<CallTemplate>, UtcpError> {
        Ok(self.current().manual_call_templates.values().cloned().collect())
    }

    async fn get_manual_name_for_tool(&self, tool_name: &str) -> Result<Option<String>, UtcpError> {
        Ok(self.current().tool_owners.get(tool_name).cloned())
    }
}
