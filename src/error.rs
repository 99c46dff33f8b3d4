use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid MCP server entry `{name}`: {message}")]
    InvalidServer { name: String, message: String },

    #[error("{var} is not set. Add it to your .env file to use model '{model}'")]
    MissingApiKey { var: String, model: String },
}

/// Errors raised while talking to an MCP tool server.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Failed to spawn `{command}`: {message}")]
    SpawnFailed { command: String, message: String },

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Connection error: {0}")]
    Transport(String),

    #[error("Request `{method}` timed out after {secs}s")]
    TimedOut { method: String, secs: u64 },

    #[error("MCP error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tool `{0}` not found")]
    UnknownTool(String),

    #[error("Server `{server}` not available for tool `{tool}`")]
    ServerUnavailable { server: String, tool: String },
}

impl McpError {
    /// Whether the failure means the underlying connection is gone and a
    /// reconnect may help.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, McpError::ConnectionClosed(_) | McpError::Transport(_))
    }
}

/// Errors related to the supervisor, sub-agents and the model backend.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("{agent} gave no final answer after {steps} steps")]
    StepLimit { agent: String, steps: usize },

    #[error("Sub-agent `{agent}` failed: {message}")]
    SubAgentFailed { agent: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_retryable() {
        assert!(McpError::ConnectionClosed("eof".into()).is_connection_error());
        assert!(McpError::Transport("reset".into()).is_connection_error());
        assert!(
            !McpError::Rpc {
                code: -32601,
                message: "no such method".into()
            }
            .is_connection_error()
        );
        assert!(
            !McpError::TimedOut {
                method: "tools/call".into(),
                secs: 30
            }
            .is_connection_error()
        );
    }

    #[test]
    fn missing_key_message_names_the_variable() {
        let err = ConfigError::MissingApiKey {
            var: "GEMINI_API_KEY".into(),
            model: "gemini-2.0-flash".into(),
        };
        assert!(err.to_string().contains("GEMINI_API_KEY"));
        assert!(err.to_string().contains(".env"));
    }
}
