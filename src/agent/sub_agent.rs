//! Sub-agent: one MCP server's tools bound to the model for a single task.
//!
//! A run is a bounded tool-use loop. The model sees the server's tools, each
//! tool call is executed through the [`McpManager`], and the results are fed
//! back until the model answers in plain text or the round limit is hit.
//! Tool failures are shown to the model as JSON errors and never abort the
//! run; only a failing model request does.

use genai::chat::{ChatMessage, ChatRequest, ToolResponse};

use super::llm::ChatBackend;
use super::logging::{LogEntry, Transcript, now_iso};
use super::progress::ProgressSink;
use super::system_prompt::sub_agent_prompt;
use super::tools::{dispatch_tool_call, mcp_tools, tool_error};
use crate::config::servers::SubAgentSpec;
use crate::error::AgentError;
use crate::mcp::{McpManager, ToolInfo};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// Borrowed context a run needs besides the task.
pub struct RunContext<'a> {
    pub backend: &'a dyn ChatBackend,
    pub manager: &'a McpManager,
    pub progress: &'a dyn ProgressSink,
    pub transcript: &'a Transcript,
}

pub struct SubAgent {
    spec: SubAgentSpec,
    tools: Vec<ToolInfo>,
    max_tool_rounds: usize,
}

impl SubAgent {
    pub fn new(spec: SubAgentSpec, tools: Vec<ToolInfo>, max_tool_rounds: usize) -> Self {
        Self {
            spec,
            tools,
            max_tool_rounds,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &SubAgentSpec {
        &self.spec
    }

    pub fn tools(&self) -> &[ToolInfo] {
        &self.tools
    }

    /// Carry out `task` and return the model's final answer.
    pub async fn run(&self, task: &str, ctx: &RunContext<'_>) -> Result<String, AgentError> {
        let mut chat_req = ChatRequest::from_system(sub_agent_prompt(&self.spec, &self.tools));
        if !self.tools.is_empty() {
            chat_req = chat_req.with_tools(mcp_tools(&self.tools));
        }
        chat_req = chat_req.append_message(ChatMessage::user(task));

        let turn = ctx.transcript.turn();
        let mut rounds = 0;

        loop {
            let reply = ctx
                .backend
                .complete(chat_req.clone())
                .await
                .map_err(|e| AgentError::SubAgentFailed {
                    agent: self.spec.name.clone(),
                    message: e.to_string(),
                })?;
            if let Some(usage) = reply.usage {
                ctx.transcript
                    .model_usage(&self.spec.name, usage.prompt_tokens, usage.completion_tokens);
            }

            if reply.tool_calls.is_empty() {
                let answer = reply
                    .text
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| format!("The {} agent finished without an answer.", self.spec.name));
                tracing::debug!(agent = %self.spec.name, rounds, "Sub-agent finished");
                return Ok(answer);
            }

            if rounds == self.max_tool_rounds {
                return Err(AgentError::StepLimit {
                    agent: format!("{} agent", self.spec.name),
                    steps: rounds,
                });
            }
            rounds += 1;

            chat_req = chat_req.append_message(ChatMessage::from(reply.tool_calls.clone()));

            for call in &reply.tool_calls {
                ctx.progress.tool_started(&call.fn_name);
                tracing::info!(agent = %self.spec.name, tool = %call.fn_name, "Tool call");
                ctx.transcript.record(LogEntry::ToolCall {
                    timestamp: now_iso(),
                    turn,
                    agent: self.spec.name.clone(),
                    call_id: call.call_id.clone(),
                    fn_name: call.fn_name.clone(),
                    fn_arguments: call.fn_arguments.clone(),
                });

                // Only this agent's tools may be called.
                let outcome = if self.tools.iter().any(|t| t.name == call.fn_name) {
                    dispatch_tool_call(call, ctx.manager).await
                } else {
                    Err(tool_error(format!(
                        "Unknown tool: {} (not provided by the {} agent)",
                        call.fn_name, self.spec.name
                    )))
                };

                let (content, error) = match outcome {
                    Ok(text) => (text, None),
                    Err(err) => {
                        tracing::warn!(agent = %self.spec.name, tool = %call.fn_name, "Tool failed: {err}");
                        (err.clone(), Some(err))
                    }
                };
                ctx.transcript.record(LogEntry::ToolResult {
                    timestamp: now_iso(),
                    turn,
                    agent: self.spec.name.clone(),
                    call_id: call.call_id.clone(),
                    fn_name: call.fn_name.clone(),
                    result: content.clone(),
                    error,
                });
                chat_req = chat_req.append_message(ToolResponse::new(call.call_id.clone(), content));
            }
        }
    }
}
