//! HTTP transport for remote MCP servers.
//!
//! Each JSON-RPC message is POSTed to the server URL. The session id handed
//! out on `initialize` (either the `Mcp-Session-Id` response header or a
//! `sessionId` field in the result) is echoed on every later request.
//! Responses may come back as plain JSON or as a short `text/event-stream`
//! body carrying the JSON in `data:` lines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::Value;
use tokio::sync::Mutex;

use super::protocol::{McpNotification, McpRequest, McpResponse};
use super::transport::{Transport, mask_secret};
use crate::error::McpError;

pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// HTTP transport for one remote MCP server.
pub struct HttpTransport {
    server: String,
    client: Client,
    url: String,
    headers: HashMap<String, String>,
    timeout: Duration,
    session_id: Mutex<Option<String>>,
    next_id: AtomicI64,
    closed: AtomicBool,
}

impl HttpTransport {
    pub fn new(
        server: &str,
        url: &str,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| McpError::Transport(e.to_string()))?;

        tracing::info!(server = %server, url = %redact_url(url), "Using HTTP MCP server");
        for (key, value) in &headers {
            tracing::debug!(server = %server, "header {}: {}", key, mask_secret(key, value));
        }

        Ok(Self {
            server: server.to_string(),
            client,
            url: url.to_string(),
            headers,
            timeout,
            session_id: Mutex::new(None),
            next_id: AtomicI64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    /// Current session id, if the server issued one.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.lock().await.clone()
    }

    async fn post(&self, body: String) -> Result<(header::HeaderMap, String), McpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::ConnectionClosed(format!("{} is closed", self.server)));
        }

        let mut req = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json, text/event-stream");
        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if let Some(session) = self.session_id.lock().await.as_deref() {
            req = req.header(SESSION_HEADER, session);
        }

        let response = req.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                McpError::TimedOut {
                    method: "http".into(),
                    secs: self.timeout.as_secs(),
                }
            } else {
                McpError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(McpError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        if let Some(session) = headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().await = Some(session.to_string());
        }

        Ok((headers, text))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::to_string(&McpRequest::new(id, method, params))
            .map_err(|e| McpError::Protocol(e.to_string()))?;
        tracing::debug!(server = %self.server, id, method, "MCP request");

        let (headers, text) = self.post(body).await?;
        let is_sse = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let response = if is_sse {
            parse_event_stream(&text, id)?
        } else {
            serde_json::from_str::<McpResponse>(&text)
                .map_err(|e| McpError::Protocol(format!("invalid JSON-RPC response: {e}")))?
        };
        let result = response.into_result()?;

        if method == "initialize" {
            if let Some(session) = result.get("sessionId").and_then(Value::as_str) {
                let mut current = self.session_id.lock().await;
                if current.is_none() {
                    *current = Some(session.to_string());
                }
            }
        }
        Ok(result)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let body = serde_json::to_string(&McpNotification::new(method, params))
            .map_err(|e| McpError::Protocol(e.to_string()))?;
        self.post(body).await.map(|_| ())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        *self.session_id.lock().await = None;
    }
}

/// The URL without credentials or query string, for logging. Expanded
/// `${VAR}` values often end up in either.
pub fn redact_url(url: &str) -> String {
    let Ok(mut parsed) = reqwest::Url::parse(url) else {
        return "<unparseable url>".to_string();
    };
    let had_query = parsed.query().is_some();
    parsed.set_query(None);
    parsed.set_fragment(None);
    if parsed.password().is_some() {
        let _ = parsed.set_password(Some("***"));
    }
    let mut redacted = parsed.to_string();
    if had_query {
        redacted.push_str("?...");
    }
    redacted
}

/// Pick the response for request `id` out of an SSE body.
///
/// Falls back to the last JSON-RPC message if none carries the id.
fn parse_event_stream(body: &str, id: i64) -> Result<McpResponse, McpError> {
    let mut last = None;
    for event in body.split("\n\n") {
        let data: Vec<&str> = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect();
        if data.is_empty() {
            continue;
        }
        let Ok(message) = serde_json::from_str::<McpResponse>(&data.join("\n")) else {
            continue;
        };
        if message.numeric_id() == Some(id) {
            return Ok(message);
        }
        last = Some(message);
    }
    last.ok_or_else(|| McpError::Protocol("event stream carried no JSON-RPC message".into()))
}
