//! Tool schemas handed to the model, and dispatch of the calls it makes.
//!
//! Two kinds of tools exist. Sub-agents see the MCP tools of their server,
//! converted to [`genai::chat::Tool`]. The supervisor sees one synthetic
//! `delegate_to_<agent>` tool per connected sub-agent.
//!
//! Tool errors are always returned as JSON strings (`{"error": "..."}`) so
//! the model can observe the failure and react.

use genai::chat::{Tool, ToolCall};
use serde_json::{Value, json};

use crate::config::servers::SubAgentSpec;
use crate::mcp::{McpManager, ToolInfo};

pub const DELEGATE_PREFIX: &str = "delegate_to_";

/// How many tool names to list in a delegate tool's description.
const MAX_LISTED_TOOLS: usize = 25;

/// JSON error payload for the model.
pub fn tool_error(message: impl std::fmt::Display) -> String {
    json!({ "error": message.to_string() }).to_string()
}

pub fn delegate_tool_name(agent: &str) -> String {
    format!("{DELEGATE_PREFIX}{agent}")
}

/// The agent a delegate tool call targets, if `fn_name` is one.
pub fn delegated_agent(fn_name: &str) -> Option<&str> {
    fn_name.strip_prefix(DELEGATE_PREFIX).filter(|a| !a.is_empty())
}

/// The supervisor-facing tool for one sub-agent.
pub fn delegate_tool(agent: &SubAgentSpec, tools: &[ToolInfo]) -> Tool {
    let mut description = format!("Delegate a task to the {} agent. {}", agent.name, agent.description);
    if !tools.is_empty() {
        let names: Vec<&str> = tools
            .iter()
            .take(MAX_LISTED_TOOLS)
            .map(|t| t.name.as_str())
            .collect();
        description.push_str(&format!(" Its tools: {}", names.join(", ")));
        if tools.len() > MAX_LISTED_TOOLS {
            description.push_str(&format!(" (and {} more)", tools.len() - MAX_LISTED_TOOLS));
        }
        description.push('.');
    }

    Tool::new(delegate_tool_name(&agent.name))
        .with_description(description)
        .with_schema(json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "A complete, self-contained description of what the agent should do, including every detail it needs from the conversation"
                }
            },
            "required": ["task"]
        }))
}

/// Convert registered MCP tools to model tools.
pub fn mcp_tools(tools: &[ToolInfo]) -> Vec<Tool> {
    tools
        .iter()
        .map(|t| {
            let mut tool = Tool::new(t.name.clone()).with_schema(clean_schema(&t.input_schema));
            if !t.description.is_empty() {
                tool = tool.with_description(t.description.clone());
            }
            tool
        })
        .collect()
}

/// Strip keys some providers reject and make sure the root is an object schema.
fn clean_schema(schema: &Value) -> Value {
    let mut schema = match schema {
        Value::Object(map) => Value::Object(map.clone()),
        _ => json!({}),
    };
    if let Some(map) = schema.as_object_mut() {
        map.remove("$schema");
        map.entry("type").or_insert_with(|| json!("object"));
        map.entry("properties").or_insert_with(|| json!({}));
    }
    schema
}

/// The `task` argument of a delegate call.
pub fn task_argument(call: &ToolCall) -> Result<String, String> {
    match call.fn_arguments.get("task").and_then(Value::as_str) {
        Some(task) if !task.trim().is_empty() => Ok(task.to_string()),
        _ => Err(format!("{}: missing or empty 'task' argument", call.fn_name)),
    }
}

/// Run one MCP tool call through the manager. The error side is already a
/// JSON error payload for the model.
pub async fn dispatch_tool_call(call: &ToolCall, manager: &McpManager) -> Result<String, String> {
    manager
        .call_tool(&call.fn_name, call.fn_arguments.clone())
        .await
        .map_err(|e| tool_error(format!("{}: {e}", call.fn_name)))
}
