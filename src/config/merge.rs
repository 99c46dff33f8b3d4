use super::schema::{AppConfig, PartialConfig};
use crate::agent::SupervisorLimits;
use crate::conversation::HistoryLimit;
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_MCP_CONFIG: &str = "mcp_config.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SCREENSHOTS_DIR: &str = "screenshots";
/// Smallest history ceilings that still leave room for a user turn and a reply.
pub const MIN_HISTORY_TOKENS: usize = 256;
pub const MIN_HISTORY_MESSAGES: usize = 2;

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            model: self.model.or(fallback.model),
            mcp_config: self.mcp_config.or(fallback.mcp_config),
            max_history_tokens: self.max_history_tokens.or(fallback.max_history_tokens),
            max_history_messages: self.max_history_messages.or(fallback.max_history_messages),
            max_supervisor_steps: self.max_supervisor_steps.or(fallback.max_supervisor_steps),
            max_tool_rounds: self.max_tool_rounds.or(fallback.max_tool_rounds),
            request_timeout_secs: self.request_timeout_secs.or(fallback.request_timeout_secs),
            screenshots_dir: self.screenshots_dir.or(fallback.screenshots_dir),
            log_dir: self.log_dir.or(fallback.log_dir),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    /// Zero limits make no sense and fall back to the defaults too; history
    /// ceilings below the minimum are raised to it.
    pub fn finalize(self) -> AppConfig {
        let history = HistoryLimit::default();
        let limits = SupervisorLimits::default();
        let positive = |v: Option<usize>, default: usize| v.filter(|n| *n > 0).unwrap_or(default);

        AppConfig {
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            mcp_config: self
                .mcp_config
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MCP_CONFIG)),
            max_history_tokens: at_least(
                "max_history_tokens",
                positive(self.max_history_tokens, history.max_tokens),
                MIN_HISTORY_TOKENS,
            ),
            max_history_messages: at_least(
                "max_history_messages",
                positive(self.max_history_messages, history.max_messages),
                MIN_HISTORY_MESSAGES,
            ),
            max_supervisor_steps: positive(self.max_supervisor_steps, limits.max_steps),
            max_tool_rounds: positive(self.max_tool_rounds, limits.max_tool_rounds),
            request_timeout_secs: self
                .request_timeout_secs
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            screenshots_dir: self
                .screenshots_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCREENSHOTS_DIR)),
            log_dir: self.log_dir,
        }
    }
}

fn at_least(name: &str, value: usize, min: usize) -> usize {
    if value < min {
        tracing::warn!("{name} = {value} is too small, using {min}");
        min
    } else {
        value
    }
}
