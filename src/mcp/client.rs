//! MCP client for a single server.
//!
//! Wraps a [`Transport`] with the MCP handshake and the two calls the agents
//! need (`tools/list`, `tools/call`). When a call fails because the
//! connection is gone, the client reconnects once through its [`Connector`]
//! and retries the call once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;

use super::http::HttpTransport;
use super::protocol::{
    InitializeParams, InitializeResult, McpToolDef, McpToolResult, ToolCallParams,
    ToolsListResult,
};
use super::transport::{StdioTransport, Transport};
use crate::config::servers::ServerSpec;
use crate::error::McpError;

/// Opens fresh transports to one server.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn Transport>, McpError>;
}

/// Connector backed by a configured [`ServerSpec`].
pub struct SpecConnector {
    server: String,
    spec: ServerSpec,
    timeout: Duration,
}

impl SpecConnector {
    pub fn new(server: &str, spec: ServerSpec, timeout: Duration) -> Self {
        Self {
            server: server.to_string(),
            spec,
            timeout,
        }
    }
}

#[async_trait]
impl Connector for SpecConnector {
    async fn open(&self) -> Result<Arc<dyn Transport>, McpError> {
        match &self.spec {
            ServerSpec::Stdio(launch) => Ok(Arc::new(
                StdioTransport::spawn(&self.server, launch, self.timeout).await?,
            )),
            ServerSpec::Http { url, headers } => Ok(Arc::new(HttpTransport::new(
                &self.server,
                url,
                headers.clone(),
                self.timeout,
            )?)),
        }
    }
}

pub struct McpClient {
    name: String,
    connector: Arc<dyn Connector>,
    transport: RwLock<Arc<dyn Transport>>,
    server_info: Option<String>,
}

impl McpClient {
    /// Connect to a configured server and complete the handshake.
    pub async fn connect(name: &str, spec: ServerSpec, timeout: Duration) -> Result<Self, McpError> {
        Self::with_connector(name, Arc::new(SpecConnector::new(name, spec, timeout))).await
    }

    /// Connect through an arbitrary connector and complete the handshake.
    pub async fn with_connector(
        name: &str,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, McpError> {
        let transport = connector.open().await?;
        let init = handshake(name, transport.as_ref()).await?;
        Ok(Self {
            name: name.to_string(),
            connector,
            transport: RwLock::new(transport),
            server_info: init.server_info.map(|s| match s.version {
                Some(v) => format!("{} {v}", s.name),
                None => s.name,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `name version` as reported by the server, if it said.
    pub fn server_info(&self) -> Option<&str> {
        self.server_info.as_deref()
    }

    pub async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError> {
        let result: ToolsListResult = self.request_with_retry("tools/list", None).await?;
        tracing::info!(server = %self.name, tools = result.tools.len(), "Listed tools");
        Ok(result.tools)
    }

    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<McpToolResult, McpError> {
        let params = ToolCallParams {
            name: tool.to_string(),
            arguments: if arguments.is_null() {
                Value::Object(Default::default())
            } else {
                arguments
            },
        };
        let params = serde_json::to_value(params).map_err(|e| McpError::Protocol(e.to_string()))?;
        self.request_with_retry("tools/call", Some(params)).await
    }

    pub async fn close(&self) {
        self.transport.read().await.close().await;
    }

    async fn request_with_retry<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<R, McpError> {
        let transport = Arc::clone(&*self.transport.read().await);
        let value = match transport.request(method, params.clone()).await {
            Ok(value) => value,
            Err(e) if e.is_connection_error() => {
                tracing::warn!(server = %self.name, error = %e, "Connection lost, reconnecting");
                let fresh = self.reconnect(&transport).await?;
                fresh.request(method, params).await?
            }
            Err(e) => return Err(e),
        };
        serde_json::from_value(value)
            .map_err(|e| McpError::Protocol(format!("unexpected `{method}` result: {e}")))
    }

    /// Replace `stale` with a freshly handshaken transport. If another task
    /// already swapped it out, reuse that one.
    async fn reconnect(&self, stale: &Arc<dyn Transport>) -> Result<Arc<dyn Transport>, McpError> {
        let mut slot = self.transport.write().await;
        if !Arc::ptr_eq(&*slot, stale) {
            return Ok(Arc::clone(&*slot));
        }
        stale.close().await;
        let fresh = self.connector.open().await?;
        handshake(&self.name, fresh.as_ref()).await?;
        *slot = Arc::clone(&fresh);
        tracing::info!(server = %self.name, "Reconnected");
        Ok(fresh)
    }
}

/// `initialize` followed by `notifications/initialized`.
async fn handshake(name: &str, transport: &dyn Transport) -> Result<InitializeResult, McpError> {
    let params =
        serde_json::to_value(InitializeParams::current()).map_err(|e| McpError::Protocol(e.to_string()))?;
    let value = transport.request("initialize", Some(params)).await?;
    let init: InitializeResult = serde_json::from_value(value)
        .map_err(|e| McpError::Protocol(format!("bad initialize result: {e}")))?;
    tracing::info!(
        server = %name,
        protocol = init.protocol_version.as_deref().unwrap_or("unknown"),
        "MCP server initialized"
    );
    transport.notify("notifications/initialized", None).await?;
    Ok(init)
}
