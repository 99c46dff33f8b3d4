//! The supervisor: the single agent the chat loop talks to.
//!
//! Each connected sub-agent is offered to the model as a
//! `delegate_to_<agent>` tool taking a `task`. The supervisor runs whatever
//! delegations the model asks for, one after another, feeds each answer
//! back, and returns the model's first plain-text reply as the assistant
//! message for the turn.

use std::sync::Arc;

use async_trait::async_trait;
use genai::chat::{ChatMessage, ChatRequest, ToolResponse};

use super::llm::ChatBackend;
use super::logging::{LogEntry, Transcript, now_iso};
use super::progress::ProgressSink;
use super::sub_agent::{DEFAULT_MAX_TOOL_ROUNDS, RunContext, SubAgent};
use super::system_prompt::{agent_roster, supervisor_prompt};
use super::tools::{delegate_tool, delegated_agent, task_argument, tool_error};
use crate::config::servers::AgentRegistry;
use crate::conversation::history::Message;
use crate::error::AgentError;
use crate::mcp::McpManager;

pub const DEFAULT_MAX_SUPERVISOR_STEPS: usize = 6;

/// What the chat loop needs from a supervisor.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Produce the assistant reply for the (already trimmed) history.
    async fn respond(&self, history: &[Message]) -> Result<Message, AgentError>;

    /// Sub-agents known to this supervisor, for `/agents`.
    fn agents(&self) -> Vec<AgentSummary>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSummary {
    pub name: String,
    pub description: String,
    pub tool_count: usize,
    /// `None` when connected, otherwise why the server is unavailable.
    pub unavailable: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorLimits {
    pub max_steps: usize,
    pub max_tool_rounds: usize,
}

impl Default for SupervisorLimits {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_SUPERVISOR_STEPS,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// Supervisor over MCP-backed sub-agents.
pub struct McpSupervisor {
    backend: Arc<dyn ChatBackend>,
    manager: Arc<McpManager>,
    agents: Vec<SubAgent>,
    unavailable: Vec<AgentSummary>,
    progress: Arc<dyn ProgressSink>,
    transcript: Transcript,
    max_steps: usize,
}

impl McpSupervisor {
    /// One sub-agent per registry entry whose server connected.
    pub fn new(
        registry: &AgentRegistry,
        manager: Arc<McpManager>,
        backend: Arc<dyn ChatBackend>,
        limits: SupervisorLimits,
        progress: Arc<dyn ProgressSink>,
        transcript: Transcript,
    ) -> Self {
        let mut agents = Vec::new();
        let mut unavailable = Vec::new();
        for spec in registry.iter() {
            if manager.is_connected(&spec.name) {
                agents.push(SubAgent::new(
                    spec.clone(),
                    manager.tools_for(&spec.name),
                    limits.max_tool_rounds,
                ));
            } else {
                let reason = manager
                    .failed()
                    .iter()
                    .find(|(name, _)| *name == spec.name)
                    .map(|(_, reason)| reason.clone())
                    .unwrap_or_else(|| "not connected".to_string());
                unavailable.push(AgentSummary {
                    name: spec.name.clone(),
                    description: spec.description.clone(),
                    tool_count: 0,
                    unavailable: Some(reason),
                });
            }
        }
        Self {
            backend,
            manager,
            agents,
            unavailable,
            progress,
            transcript,
            max_steps: limits.max_steps,
        }
    }

    fn build_request(&self, history: &[Message]) -> ChatRequest {
        let roster_entries: Vec<_> = self
            .agents
            .iter()
            .map(|a| (a.spec(), a.tools().len()))
            .collect();
        let prompt = supervisor_prompt(self.backend.model(), &agent_roster(&roster_entries));

        let mut chat_req = ChatRequest::from_system(prompt);
        if !self.agents.is_empty() {
            chat_req = chat_req.with_tools(
                self.agents
                    .iter()
                    .map(|a| delegate_tool(a.spec(), a.tools()))
                    .collect::<Vec<_>>(),
            );
        }
        for message in history {
            chat_req = chat_req.append_message(message.to_chat_message());
        }
        chat_req
    }

    async fn delegate(&self, agent_name: &str, task: &str) -> String {
        let Some(agent) = self.agents.iter().find(|a| a.name() == agent_name) else {
            return tool_error(format!("Unknown agent: {agent_name}"));
        };

        self.progress.delegating(agent_name);
        tracing::info!(agent = %agent_name, "Delegating task");
        self.transcript.record(LogEntry::Delegation {
            timestamp: now_iso(),
            turn: self.transcript.turn(),
            agent: agent_name.to_string(),
            task: task.to_string(),
        });

        let ctx = RunContext {
            backend: self.backend.as_ref(),
            manager: self.manager.as_ref(),
            progress: self.progress.as_ref(),
            transcript: &self.transcript,
        };
        match agent.run(task, &ctx).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(agent = %agent_name, error = %e, "Sub-agent failed");
                tool_error(e)
            }
        }
    }
}

#[async_trait]
impl Supervisor for McpSupervisor {
    async fn respond(&self, history: &[Message]) -> Result<Message, AgentError> {
        let mut chat_req = self.build_request(history);
        let mut steps = 0;

        loop {
            let reply = self.backend.complete(chat_req.clone()).await?;
            if let Some(usage) = reply.usage {
                self.transcript
                    .model_usage("supervisor", usage.prompt_tokens, usage.completion_tokens);
            }

            if reply.tool_calls.is_empty() {
                return match reply.text {
                    Some(text) if !text.trim().is_empty() => Ok(Message::assistant(text.trim())),
                    _ => Err(AgentError::LlmError("the model returned an empty reply".into())),
                };
            }

            if steps == self.max_steps {
                return Err(AgentError::StepLimit {
                    agent: "supervisor".to_string(),
                    steps,
                });
            }
            steps += 1;

            chat_req = chat_req.append_message(ChatMessage::from(reply.tool_calls.clone()));
            for call in &reply.tool_calls {
                let content = match (delegated_agent(&call.fn_name), task_argument(call)) {
                    (Some(agent), Ok(task)) => self.delegate(agent, &task).await,
                    (Some(_), Err(e)) => tool_error(e),
                    (None, _) => tool_error(format!("Unknown tool: {}", call.fn_name)),
                };
                chat_req = chat_req.append_message(ToolResponse::new(call.call_id.clone(), content));
            }
        }
    }

    fn agents(&self) -> Vec<AgentSummary> {
        let mut summaries: Vec<AgentSummary> = self
            .agents
            .iter()
            .map(|a| AgentSummary {
                name: a.name().to_string(),
                description: a.spec().description.clone(),
                tool_count: a.tools().len(),
                unavailable: None,
            })
            .collect();
        summaries.extend(self.unavailable.iter().cloned());
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::ModelReply;
    use crate::agent::llm::tests::{ScriptedBackend, call};
    use crate::agent::progress::SilentProgress;
    use crate::config::servers::{ServerSpec, SubAgentSpec};
    use crate::mcp::client::tests::FakeConnector;
    use crate::mcp::{McpClient, McpSettings};
    use genai::chat::ChatRole;
    use serde_json::json;
    use std::collections::HashMap;

    fn spec(name: &str) -> SubAgentSpec {
        SubAgentSpec {
            name: name.into(),
            description: format!("{name} things"),
            server: ServerSpec::Http {
                url: "http://localhost/mcp".into(),
                headers: HashMap::new(),
            },
            tool_defaults: Default::default(),
        }
    }

    async fn supervisor(backend: Arc<ScriptedBackend>) -> McpSupervisor {
        let registry = AgentRegistry::from_specs(vec![spec("github"), spec("gmail")]);
        let mut manager = McpManager::new(McpSettings::default());
        let connector = Arc::new(FakeConnector::new(vec!["list_repos"], 0));
        let client = McpClient::with_connector("github", connector).await.unwrap();
        let defs = client.list_tools().await.unwrap();
        manager.add_server(client, defs, Default::default());

        McpSupervisor::new(
            &registry,
            Arc::new(manager),
            backend,
            SupervisorLimits::default(),
            Arc::new(SilentProgress),
            Transcript::disabled(),
        )
    }

    #[tokio::test]
    async fn plain_reply_needs_no_delegation() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(ModelReply::text(" Hi there! "))]));
        let sup = supervisor(backend.clone()).await;
        let reply = sup.respond(&[Message::user("hello")]).await.unwrap();
        assert_eq!(reply, Message::assistant("Hi there!"));

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(1));
        assert_eq!(requests[0].messages.last().unwrap().role, ChatRole::User);
    }

    #[tokio::test]
    async fn delegation_round_trip() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            // supervisor: delegate
            Ok(ModelReply::tool_calls(vec![call(
                "d1",
                "delegate_to_github",
                json!({"task": "list repos of octo"}),
            )])),
            // github sub-agent: call tool, then answer
            Ok(ModelReply::tool_calls(vec![call("c1", "list_repos", json!({}))])),
            Ok(ModelReply::text("octo has: sphere")),
            // supervisor: final answer
            Ok(ModelReply::text("You have one repo, sphere.")),
        ]));
        let sup = supervisor(backend.clone()).await;
        let reply = sup.respond(&[Message::user("what repos do I have?")]).await.unwrap();
        assert_eq!(reply.content(), "You have one repo, sphere.");

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 4);
        // The sub-agent only sees its task, not the conversation.
        let sub_first = &requests[1];
        assert_eq!(
            sub_first.messages.last().unwrap().content.first_text(),
            Some("list repos of octo")
        );
        // The supervisor's final request ends with the delegate's answer.
        let last = requests[3].messages.last().unwrap();
        assert_eq!(last.role, ChatRole::Tool);
    }

    #[tokio::test]
    async fn unknown_agent_is_fed_back_as_error() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(ModelReply::tool_calls(vec![call(
                "d1",
                "delegate_to_slack",
                json!({"task": "post"}),
            )])),
            Ok(ModelReply::text("Slack is not available.")),
        ]));
        let sup = supervisor(backend).await;
        let reply = sup.respond(&[Message::user("post to slack")]).await.unwrap();
        assert_eq!(reply.content(), "Slack is not available.");
    }

    #[tokio::test]
    async fn step_limit_and_empty_reply_are_errors() {
        let delegate = || {
            Ok(ModelReply::tool_calls(vec![call(
                "d",
                "delegate_to_nobody",
                json!({"task": "x"}),
            )]))
        };
        let replies = (0..=DEFAULT_MAX_SUPERVISOR_STEPS).map(|_| delegate()).collect();
        let sup = supervisor(Arc::new(ScriptedBackend::new(replies))).await;
        let err = sup.respond(&[Message::user("loop")]).await.unwrap_err();
        assert!(matches!(err, AgentError::StepLimit { .. }));

        let sup = supervisor(Arc::new(ScriptedBackend::new(vec![Ok(ModelReply::default())]))).await;
        assert!(sup.respond(&[Message::user("hi")]).await.is_err());
    }

    #[tokio::test]
    async fn agents_lists_connected_and_unavailable() {
        let sup = supervisor(Arc::new(ScriptedBackend::new(vec![]))).await;
        let agents = sup.agents();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].name, "github");
        assert_eq!(agents[0].tool_count, 1);
        assert!(agents[0].unavailable.is_none());
        assert_eq!(agents[1].name, "gmail");
        assert!(agents[1].unavailable.is_some());
    }
}
