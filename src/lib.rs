pub mod agent;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod mcp;
