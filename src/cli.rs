use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sphere",
    version,
    about = "Chat with a supervisor that delegates to MCP-backed sub-agents",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Options for the default `chat` command
    #[command(flatten)]
    pub chat: ChatArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive chat session (the default)
    Chat(ChatArgs),
    /// Connect to the configured MCP servers, list their tools, and exit
    Servers {
        /// Path to the MCP server list
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Path to a sphere.toml settings file (overrides ./sphere.toml)
        #[arg(long)]
        settings: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ChatArgs {
    /// Model name, e.g. "gemini-2.0-flash", "claude-sonnet-4-5", "gpt-4o"
    #[arg(short, long)]
    pub model: Option<String>,

    /// Path to the MCP server list (default: mcp_config.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to a sphere.toml settings file (overrides ./sphere.toml)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Estimated-token ceiling for the conversation history
    #[arg(long)]
    pub max_history_tokens: Option<usize>,

    /// Write a JSONL transcript of each session into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl Cli {
    /// The command to run; bare `sphere` means `chat`.
    pub fn resolved_command(&self) -> Commands {
        match &self.command {
            Some(Commands::Chat(args)) => Commands::Chat(args.clone()),
            Some(Commands::Servers { config, settings }) => Commands::Servers {
                config: config.clone(),
                settings: settings.clone(),
            },
            None => Commands::Chat(self.chat.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_is_chat() {
        let cli = Cli::parse_from(["sphere", "--model", "gpt-4o"]);
        match cli.resolved_command() {
            Commands::Chat(args) => assert_eq!(args.model.as_deref(), Some("gpt-4o")),
            other => panic!("expected chat, got {other:?}"),
        }
    }

    #[test]
    fn explicit_subcommands() {
        let cli = Cli::parse_from(["sphere", "chat", "--max-history-tokens", "500"]);
        match cli.resolved_command() {
            Commands::Chat(args) => assert_eq!(args.max_history_tokens, Some(500)),
            other => panic!("expected chat, got {other:?}"),
        }

        let cli = Cli::parse_from(["sphere", "servers", "--config", "servers.json"]);
        match cli.resolved_command() {
            Commands::Servers { config, .. } => {
                assert_eq!(config, Some(PathBuf::from("servers.json")))
            }
            other => panic!("expected servers, got {other:?}"),
        }
    }
}
