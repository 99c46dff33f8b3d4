pub mod llm;
pub mod logging;
pub mod progress;
pub mod sub_agent;
pub mod supervisor;
pub mod system_prompt;
pub mod tools;

pub use supervisor::{AgentSummary, McpSupervisor, Supervisor, SupervisorLimits};
