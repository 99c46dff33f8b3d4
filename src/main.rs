use std::io;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;

use sphere::agent::llm::{GenaiBackend, check_provider_key};
use sphere::agent::logging::{SessionLogger, Transcript};
use sphere::agent::progress::StderrProgress;
use sphere::agent::McpSupervisor;
use sphere::cli::{ChatArgs, Cli, Commands};
use sphere::config::{self, AppConfig, servers::AgentRegistry};
use sphere::conversation::{ChatLoop, LoopExit};
use sphere::mcp::McpManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // stdout is the chat surface, so diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.resolved_command() {
        Commands::Chat(args) => chat(&args).await,
        Commands::Servers { config, settings } => {
            let args = ChatArgs {
                config,
                settings,
                ..Default::default()
            };
            servers(&args).await
        }
    }
}

async fn chat(args: &ChatArgs) -> anyhow::Result<()> {
    let config = config::load_config(args).context("Failed to load settings")?;
    check_provider_key(&config.model, |var| std::env::var(var).ok())?;
    tracing::info!(model = %config.model, mcp_config = %config.mcp_config.display(), "Config loaded");

    let registry = AgentRegistry::load(&config.mcp_config)?;
    let transcript = open_transcript(&config);

    println!("sphere: chat with {} ({} sub-agents configured)", config.model, registry.len());
    let manager = Arc::new(start_servers(&registry, &config).await);
    report_failures(&manager);
    println!("Type /help for commands, /exit to quit.\n");

    let supervisor = McpSupervisor::new(
        &registry,
        manager.clone(),
        Arc::new(GenaiBackend::new(config.model.clone())),
        config.supervisor_limits(),
        Arc::new(StderrProgress),
        transcript.clone(),
    );
    transcript.session_start(
        &config.model,
        registry.names().into_iter().map(String::from).collect(),
    );

    let mut chat_loop = ChatLoop::new(supervisor, config.history_limit(), transcript.clone());
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let outcome = chat_loop.run(stdin.lock(), &mut stdout).await;

    let reason = match &outcome {
        Ok(LoopExit::Quit) => "user_exit",
        Ok(LoopExit::EndOfInput) => "end_of_input",
        Err(_) => "io_error",
    };
    transcript.session_end(reason);
    manager.shutdown().await;
    if let Some(path) = transcript.log_path() {
        tracing::info!("Session log written to {}", path.display());
    }

    outcome.map(|_| ())
}

async fn servers(args: &ChatArgs) -> anyhow::Result<()> {
    let config = config::load_config(args).context("Failed to load settings")?;
    let registry = AgentRegistry::load(&config.mcp_config)?;
    if registry.is_empty() {
        println!("No enabled MCP servers in {}", config.mcp_config.display());
        return Ok(());
    }

    let manager = start_servers(&registry, &config).await;
    for spec in registry.iter() {
        if !manager.is_connected(&spec.name) {
            continue;
        }
        let server_info = manager.server_info(&spec.name).unwrap_or("unknown server");
        println!("{} [{}] {}", spec.name, spec.server.kind(), server_info);
        println!("  {}", spec.description);
        for tool in manager.tools_for(&spec.name) {
            let summary = tool.description.lines().next().unwrap_or("");
            println!("    - {}  {}", tool.name, summary);
        }
    }
    report_failures(&manager);
    manager.shutdown().await;
    Ok(())
}

async fn start_servers(registry: &AgentRegistry, config: &AppConfig) -> McpManager {
    let manager = McpManager::start(registry, config.mcp_settings()).await;
    tracing::info!(
        connected = registry.len() - manager.failed().len(),
        tools = manager.all_tools().len(),
        "MCP servers started"
    );
    manager
}

fn report_failures(manager: &McpManager) {
    for (server, reason) in manager.failed() {
        eprintln!("Warning: MCP server '{server}' is unavailable: {reason}");
    }
}

fn open_transcript(config: &AppConfig) -> Transcript {
    let Some(dir) = &config.log_dir else {
        return Transcript::disabled();
    };
    match SessionLogger::new(dir) {
        Ok(logger) => {
            tracing::info!("Session log: {}", logger.log_path().display());
            Transcript::new(logger)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not open session log in {}", dir.display());
            Transcript::disabled()
        }
    }
}

