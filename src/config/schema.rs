use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::agent::SupervisorLimits;
use crate::conversation::HistoryLimit;
use crate::mcp::McpSettings;

/// The TOML file structure for sphere.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub history: Option<HistoryConfig>,
    pub agent: Option<AgentConfig>,
    pub mcp: Option<McpConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub model: Option<String>,
    /// Path to the MCP server list (mcp_config.json).
    pub mcp_config: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryConfig {
    pub max_tokens: Option<usize>,
    pub max_messages: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    pub max_supervisor_steps: Option<usize>,
    pub max_tool_rounds: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct McpConfig {
    pub request_timeout_secs: Option<u64>,
    pub screenshots_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Directory for JSONL session transcripts. Unset disables them.
    pub log_dir: Option<String>,
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: String,
    pub mcp_config: PathBuf,
    pub max_history_tokens: usize,
    pub max_history_messages: usize,
    pub max_supervisor_steps: usize,
    pub max_tool_rounds: usize,
    pub request_timeout_secs: u64,
    pub screenshots_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn history_limit(&self) -> HistoryLimit {
        HistoryLimit {
            max_tokens: self.max_history_tokens,
            max_messages: self.max_history_messages,
        }
    }

    pub fn supervisor_limits(&self) -> SupervisorLimits {
        SupervisorLimits {
            max_steps: self.max_supervisor_steps,
            max_tool_rounds: self.max_tool_rounds,
        }
    }

    pub fn mcp_settings(&self) -> McpSettings {
        McpSettings {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            screenshots_dir: self.screenshots_dir.clone(),
        }
    }
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub model: Option<String>,
    pub mcp_config: Option<PathBuf>,
    pub max_history_tokens: Option<usize>,
    pub max_history_messages: Option<usize>,
    pub max_supervisor_steps: Option<usize>,
    pub max_tool_rounds: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub screenshots_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl ConfigFile {
    pub fn to_partial(self) -> PartialConfig {
        let general = self.general;
        let history = self.history;
        let agent = self.agent;
        let mcp = self.mcp;
        PartialConfig {
            model: general.as_ref().and_then(|g| g.model.clone()),
            mcp_config: general
                .as_ref()
                .and_then(|g| g.mcp_config.as_ref())
                .map(PathBuf::from),
            max_history_tokens: history.as_ref().and_then(|h| h.max_tokens),
            max_history_messages: history.as_ref().and_then(|h| h.max_messages),
            max_supervisor_steps: agent.as_ref().and_then(|a| a.max_supervisor_steps),
            max_tool_rounds: agent.as_ref().and_then(|a| a.max_tool_rounds),
            request_timeout_secs: mcp.as_ref().and_then(|m| m.request_timeout_secs),
            screenshots_dir: mcp
                .as_ref()
                .and_then(|m| m.screenshots_dir.as_ref())
                .map(PathBuf::from),
            log_dir: self.logging.and_then(|l| l.log_dir).map(PathBuf::from),
        }
    }
}
