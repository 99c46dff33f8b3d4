//! Owns every MCP client for the session.
//!
//! All enabled servers are connected concurrently at startup; a server that
//! fails to connect is logged, remembered in [`McpManager::failed`] and
//! otherwise ignored. After startup the tool set is fixed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::{Map, Value, json};

use super::client::McpClient;
use super::protocol::McpToolDef;
use super::registry::{ToolInfo, ToolRegistry};
use super::result;
use crate::config::servers::AgentRegistry;
use crate::error::McpError;

/// Runtime knobs for MCP traffic.
#[derive(Debug, Clone)]
pub struct McpSettings {
    pub request_timeout: Duration,
    pub screenshots_dir: PathBuf,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            screenshots_dir: PathBuf::from("screenshots"),
        }
    }
}

pub struct McpManager {
    clients: HashMap<String, Arc<McpClient>>,
    registry: ToolRegistry,
    defaults: HashMap<String, Map<String, Value>>,
    failed: Vec<(String, String)>,
    settings: McpSettings,
}

impl McpManager {
    /// A manager with no servers.
    pub fn new(settings: McpSettings) -> Self {
        Self {
            clients: HashMap::new(),
            registry: ToolRegistry::new(),
            defaults: HashMap::new(),
            failed: Vec::new(),
            settings,
        }
    }

    /// Connect every server in `agents` concurrently and register its tools.
    pub async fn start(agents: &AgentRegistry, settings: McpSettings) -> Self {
        let timeout = settings.request_timeout;
        let attempts = agents.iter().map(|spec| async move {
            let outcome = async {
                let client = McpClient::connect(&spec.name, spec.server.clone(), timeout).await?;
                let tools = client.list_tools().await?;
                Ok::<_, McpError>((client, tools))
            }
            .await;
            (spec, outcome)
        });

        let mut manager = Self::new(settings);
        // Register in config order so conflict renaming is deterministic.
        for (spec, outcome) in join_all(attempts).await {
            match outcome {
                Ok((client, tools)) => {
                    let count = manager.add_server(client, tools, spec.tool_defaults.clone());
                    tracing::info!(server = %spec.name, tools = count, "MCP server ready");
                }
                Err(e) => {
                    tracing::error!(server = %spec.name, error = %e, "Failed to initialize MCP server");
                    manager.failed.push((spec.name.clone(), e.to_string()));
                }
            }
        }
        manager
    }

    /// Register an already connected client and its tools. Returns the
    /// number of tools registered.
    pub fn add_server(
        &mut self,
        client: McpClient,
        tools: Vec<McpToolDef>,
        tool_defaults: Map<String, Value>,
    ) -> usize {
        let server = client.name().to_string();
        self.registry.clear_server(&server);
        for tool in &tools {
            let schema = advertise_defaults(tool.input_schema.clone(), &tool_defaults);
            self.registry.register(
                &server,
                &tool.name,
                tool.description.as_deref().unwrap_or(""),
                schema,
            );
        }
        if !tool_defaults.is_empty() {
            self.defaults.insert(server.clone(), tool_defaults);
        }
        self.clients.insert(server, Arc::new(client));
        tools.len()
    }

    pub fn is_connected(&self, server: &str) -> bool {
        self.clients.contains_key(server)
    }

    /// Servers that failed to start, with the reason.
    pub fn failed(&self) -> &[(String, String)] {
        &self.failed
    }

    pub fn tools_for(&self, server: &str) -> Vec<ToolInfo> {
        self.registry.by_server(server)
    }

    pub fn all_tools(&self) -> Vec<ToolInfo> {
        self.registry.all()
    }

    pub fn server_info(&self, server: &str) -> Option<&str> {
        self.clients.get(server).and_then(|c| c.server_info())
    }

    /// Call a registered tool and render its result as text.
    ///
    /// Configured defaults are filled in for arguments the caller left out.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, McpError> {
        let info = self
            .registry
            .get(tool)
            .ok_or_else(|| McpError::UnknownTool(tool.to_string()))?;
        let client = self
            .clients
            .get(&info.server)
            .ok_or_else(|| McpError::ServerUnavailable {
                server: info.server.clone(),
                tool: tool.to_string(),
            })?;

        let arguments = match self.defaults.get(&info.server) {
            Some(defaults) => inject_defaults(arguments, defaults),
            None => arguments,
        };
        tracing::debug!(server = %info.server, tool = %info.original_name, args = %arguments, "Calling tool");

        let raw = client.call_tool(&info.original_name, arguments).await?;
        Ok(result::render(&raw, &self.settings.screenshots_dir))
    }

    /// Close every client (kills stdio child processes).
    pub async fn shutdown(&self) {
        join_all(self.clients.values().map(|client| async move {
            tracing::debug!(server = %client.name(), "Closing MCP client");
            client.close().await;
        }))
        .await;
    }
}

/// Fill in defaults for keys the caller did not supply.
pub fn inject_defaults(arguments: Value, defaults: &Map<String, Value>) -> Value {
    let mut args = match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => return other,
    };
    for (key, value) in defaults {
        if !args.contains_key(key) {
            args.insert(key.clone(), value.clone());
        }
    }
    Value::Object(args)
}

/// Add each default to the schema's properties (when absent) so the model
/// knows the value will be supplied.
pub fn advertise_defaults(mut schema: Value, defaults: &Map<String, Value>) -> Value {
    if defaults.is_empty() {
        return schema;
    }
    let Some(obj) = schema.as_object_mut() else {
        return schema;
    };
    let properties = obj
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(properties) = properties.as_object_mut() else {
        return schema;
    };
    for (key, value) in defaults {
        if properties.contains_key(key) {
            continue;
        }
        let shown = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        properties.insert(
            key.clone(),
            json!({
                "type": json_type(value),
                "description": format!("Default parameter (injected): {shown}"),
                "default": value,
            }),
        );
    }
    schema
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::String(_) | Value::Null => "string",
    }
}
