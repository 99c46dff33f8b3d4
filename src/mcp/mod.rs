//! Model Context Protocol client side: transports, per-server clients, the
//! tool registry and the manager that ties them together.

pub mod client;
pub mod http;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod result;
pub mod transport;

pub use client::McpClient;
pub use manager::{McpManager, McpSettings};
pub use registry::{ToolInfo, ToolRegistry};
