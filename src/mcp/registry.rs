//! Tool registry: maps exposed tool names to the server that owns them.

use std::collections::HashMap;

use serde_json::Value;

/// A tool as exposed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInfo {
    /// Name the model sees (may be `<server>_<tool>` after a conflict).
    pub name: String,
    /// Name the server knows the tool by.
    pub original_name: String,
    pub server: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolInfo>,
    /// Registration order per server.
    by_server: HashMap<String, Vec<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool and return the name it was registered under.
    ///
    /// A name already owned by another server is prefixed with this
    /// server's name.
    pub fn register(
        &mut self,
        server: &str,
        tool: &str,
        description: &str,
        input_schema: Value,
    ) -> String {
        let mut name = tool.to_string();
        if self.tools.get(&name).is_some_and(|t| t.server != server) {
            name = format!("{server}_{tool}");
            tracing::warn!(server = %server, tool = %tool, "Tool name conflict, registered as {name}");
        }

        self.tools.insert(
            name.clone(),
            ToolInfo {
                name: name.clone(),
                original_name: tool.to_string(),
                server: server.to_string(),
                description: description.to_string(),
                input_schema,
            },
        );
        let names = self.by_server.entry(server.to_string()).or_default();
        if !names.contains(&name) {
            names.push(name.clone());
        }
        name
    }

    pub fn get(&self, name: &str) -> Option<&ToolInfo> {
        self.tools.get(name)
    }

    /// Tools of one server, in registration order.
    pub fn by_server(&self, server: &str) -> Vec<ToolInfo> {
        self.by_server
            .get(server)
            .into_iter()
            .flatten()
            .filter_map(|name| self.tools.get(name).cloned())
            .collect()
    }

    /// All tools, sorted by name.
    pub fn all(&self) -> Vec<ToolInfo> {
        let mut tools: Vec<ToolInfo> = self.tools.values().cloned().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Forget every tool of `server` (before re-registering after a reconnect).
    pub fn clear_server(&mut self, server: &str) {
        if let Some(names) = self.by_server.remove(server) {
            for name in names {
                self.tools.remove(&name);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
