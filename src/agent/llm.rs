//! Model backend abstraction.
//!
//! [`ChatBackend`] is the seam between the agents and the model provider:
//! the supervisor and sub-agents build a [`ChatRequest`] and get back the
//! captured text and tool calls of one model turn. [`GenaiBackend`] streams
//! through the `genai` client and captures the final content; tests plug in
//! scripted backends.

use async_trait::async_trait;
use futures::StreamExt;
use genai::Client;
use genai::chat::{ChatOptions, ChatRequest, ChatStreamEvent, ToolCall};

use crate::error::{AgentError, ConfigError};

/// Token counts reported by the provider for one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Everything the agents need from one model turn.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    /// Run one model turn.
    async fn complete(&self, request: ChatRequest) -> Result<ModelReply, AgentError>;
}

/// `genai`-backed model client. The provider is inferred from the model name.
pub struct GenaiBackend {
    client: Client,
    model: String,
    options: ChatOptions,
}

impl GenaiBackend {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::default(),
            model: model.into(),
            options: ChatOptions::default()
                .with_capture_content(true)
                .with_capture_tool_calls(true)
                .with_capture_usage(true),
        }
    }
}

#[async_trait]
impl ChatBackend for GenaiBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<ModelReply, AgentError> {
        let stream_res = self
            .client
            .exec_chat_stream(&self.model, request, Some(&self.options))
            .await
            .map_err(|e| AgentError::LlmError(e.to_string()))?;

        let mut stream = stream_res.stream;
        let mut reply = ModelReply::default();
        let mut stream_error = None;

        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatStreamEvent::End(end)) => {
                    if let Some(text) = end.captured_first_text() {
                        reply.text = Some(text.to_string());
                    }
                    if let Some(calls) = end.captured_tool_calls() {
                        reply.tool_calls = calls.into_iter().cloned().collect();
                    }
                    if let Some(usage) = &end.captured_usage {
                        reply.usage = Some(TokenUsage {
                            prompt_tokens: usage.prompt_tokens.unwrap_or(0) as usize,
                            completion_tokens: usage.completion_tokens.unwrap_or(0) as usize,
                        });
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(model = %self.model, error = %e, "Stream error");
                    stream_error = Some(e.to_string());
                }
            }
        }

        // An error with nothing captured means the turn produced nothing usable.
        match stream_error {
            Some(e) if reply.text.is_none() && reply.tool_calls.is_empty() => {
                Err(AgentError::LlmError(e))
            }
            _ => Ok(reply),
        }
    }
}

/// The API key environment variable the model's provider needs, if any.
pub fn required_api_key(model: &str) -> Option<&'static str> {
    let model = model.to_ascii_lowercase();
    let model = model.rsplit("::").next().unwrap_or(&model);
    if model.starts_with("gemini") {
        Some("GEMINI_API_KEY")
    } else if model.starts_with("claude") {
        Some("ANTHROPIC_API_KEY")
    } else if ["gpt", "o1", "o3", "o4", "chatgpt"]
        .iter()
        .any(|p| model.starts_with(p))
    {
        Some("OPENAI_API_KEY")
    } else if model.starts_with("grok") {
        Some("XAI_API_KEY")
    } else if model.starts_with("deepseek") {
        Some("DEEPSEEK_API_KEY")
    } else if model.starts_with("command") {
        Some("COHERE_API_KEY")
    } else {
        None
    }
}

/// Fail early when the provider key for `model` is missing or empty.
pub fn check_provider_key(
    model: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let Some(var) = required_api_key(model) else {
        return Ok(());
    };
    match lookup(var) {
        Some(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::MissingApiKey {
            var: var.to_string(),
            model: model.to_string(),
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend that replays canned replies and records every request.
    pub(crate) struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<ModelReply, AgentError>>>,
        pub requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(replies: Vec<Result<ModelReply, AgentError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ChatRequest) -> Result<ModelReply, AgentError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::LlmError("script exhausted".into())))
        }
    }

    pub(crate) fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            call_id: id.to_string(),
            fn_name: name.to_string(),
            fn_arguments: args,
            thought_signatures: None,
        }
    }

    #[test]
    fn provider_keys_follow_model_family() {
        assert_eq!(required_api_key("gemini-2.0-flash"), Some("GEMINI_API_KEY"));
        assert_eq!(required_api_key("claude-3-5-sonnet-latest"), Some("ANTHROPIC_API_KEY"));
        assert_eq!(required_api_key("gpt-4o-mini"), Some("OPENAI_API_KEY"));
        assert_eq!(required_api_key("o3-mini"), Some("OPENAI_API_KEY"));
        assert_eq!(required_api_key("llama3.2"), None);
    }

    #[test]
    fn missing_or_blank_key_is_rejected() {
        let err = check_provider_key("gemini-2.0-flash", |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey { ref var, .. } if var == "GEMINI_API_KEY"));
        assert!(check_provider_key("gemini-2.0-flash", |_| Some("  ".into())).is_err());
        assert!(check_provider_key("gemini-2.0-flash", |_| Some("k".into())).is_ok());
        assert!(check_provider_key("qwen2.5:7b", |_| None).is_ok());
    }

    #[tokio::test]
    async fn scripted_backend_replays_in_order() {
        let backend = ScriptedBackend::new(vec![Ok(ModelReply::text("one"))]);
        let first = backend.complete(ChatRequest::from_system("s")).await.unwrap();
        assert_eq!(first.text.as_deref(), Some("one"));
        assert!(backend.complete(ChatRequest::from_system("s")).await.is_err());
        assert_eq!(backend.requests.lock().unwrap().len(), 2);
    }
}
