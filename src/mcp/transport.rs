//! MCP transports.
//!
//! A [`Transport`] carries JSON-RPC requests to one server and hands back the
//! `result` value. Two implementations exist: [`StdioTransport`] for servers
//! spawned as child processes (newline-delimited JSON on stdin/stdout) and
//! [`super::http::HttpTransport`] for remote servers.
//!
//! The stdio transport owns a background receive task that routes each
//! response to the request waiting on it through a `oneshot` channel, so
//! requests never race each other for stdout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;

use super::protocol::{McpNotification, McpRequest, McpResponse};
use crate::error::McpError;

type Pending = Arc<Mutex<HashMap<i64, oneshot::Sender<Result<Value, McpError>>>>>;

/// A request/response channel to one MCP server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for its `result`.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError>;

    /// Send a notification; no response is expected.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError>;

    /// Release the connection (kill the child process, forget the session).
    async fn close(&self);
}

/// Process launch parameters for a stdio server.
#[derive(Debug, Clone)]
pub struct StdioCommand {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

/// Stdio transport over a spawned MCP server process.
pub struct StdioTransport {
    server: String,
    stdin: Mutex<ChildStdin>,
    child: Mutex<Child>,
    pending: Pending,
    next_id: AtomicI64,
    timeout: Duration,
    cancel: CancellationToken,
}

impl StdioTransport {
    /// Spawn the server process and start the receive loop.
    pub async fn spawn(
        server: &str,
        launch: &StdioCommand,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        tracing::info!(server = %server, command = %launch.command, args = ?masked_args(&launch.args), "Spawning MCP server");
        for (key, value) in &launch.env {
            tracing::debug!(server = %server, "env {}={}", key, mask_secret(key, value));
        }

        let mut cmd = Command::new(&launch.command);
        cmd.args(&launch.args)
            .envs(&launch.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &launch.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            command: launch.command.clone(),
            message: if e.kind() == std::io::ErrorKind::NotFound {
                "command not found, is it installed and in PATH?".to_string()
            } else {
                e.to_string()
            },
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Protocol("child has no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Protocol("child has no stdout".into()))?;
        let stderr = child.stderr.take();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        // Receive loop: route responses by id until EOF or cancellation.
        let recv_pending = Arc::clone(&pending);
        let recv_cancel = cancel.clone();
        let recv_server = server.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    _ = recv_cancel.cancelled() => {
                        tracing::debug!(server = %recv_server, "Receive loop cancelled");
                        break;
                    }
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => route_line(&recv_server, line.trim(), &recv_pending).await,
                        Ok(None) => {
                            tracing::warn!(server = %recv_server, "MCP server closed stdout");
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(server = %recv_server, error = %e, "MCP receive error");
                            break;
                        }
                    }
                }
            }
            // Later requests fail fast as closed instead of waiting out the timeout.
            recv_cancel.cancel();
            for (_, tx) in recv_pending.lock().await.drain() {
                let _ = tx.send(Err(McpError::ConnectionClosed(format!(
                    "{recv_server} stopped responding"
                ))));
            }
        });

        // Server diagnostics go to our log, never to the chat surface.
        if let Some(stderr) = stderr {
            let err_server = server.to_string();
            let err_cancel = cancel.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                loop {
                    tokio::select! {
                        _ = err_cancel.cancelled() => break,
                        line = lines.next_line() => match line {
                            Ok(Some(line)) => tracing::debug!(server = %err_server, "stderr: {line}"),
                            _ => break,
                        }
                    }
                }
            });
        }

        Ok(Self {
            server: server.to_string(),
            stdin: Mutex::new(stdin),
            child: Mutex::new(child),
            pending,
            next_id: AtomicI64::new(1),
            timeout,
            cancel,
        })
    }

    async fn send_line(&self, json: &str) -> Result<(), McpError> {
        let mut stdin = self.stdin.lock().await;
        let write = async {
            stdin.write_all(json.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        write
            .await
            .map_err(|e| McpError::ConnectionClosed(format!("{}: {e}", self.server)))
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        if self.cancel.is_cancelled() {
            return Err(McpError::ConnectionClosed(format!("{} is closed", self.server)));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let json = serde_json::to_string(&McpRequest::new(id, method, params))
            .map_err(|e| McpError::Protocol(e.to_string()))?;
        tracing::debug!(server = %self.server, id, method, "MCP request");

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.send_line(&json).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::ConnectionClosed(format!(
                "{} dropped the request",
                self.server
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::TimedOut {
                    method: method.to_string(),
                    secs: self.timeout.as_secs(),
                })
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let json = serde_json::to_string(&McpNotification::new(method, params))
            .map_err(|e| McpError::Protocol(e.to_string()))?;
        tracing::debug!(server = %self.server, method, "MCP notify");
        self.send_line(&json).await
    }

    async fn close(&self) {
        self.cancel.cancel();
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            tracing::debug!(server = %self.server, error = %e, "Kill failed (already exited?)");
        }
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Deliver one stdout line to the request waiting for it.
async fn route_line(server: &str, line: &str, pending: &Pending) {
    if line.is_empty() {
        return;
    }
    if !line.starts_with('{') {
        tracing::debug!(server = %server, "Skipping non-JSON line: {line}");
        return;
    }
    let response: McpResponse = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(server = %server, error = %e, "Unparseable message");
            return;
        }
    };
    match response.numeric_id() {
        Some(id) => {
            if let Some(tx) = pending.lock().await.remove(&id) {
                let _ = tx.send(response.into_result());
            }
        }
        None => {
            if let Some(method) = &response.method {
                tracing::debug!(server = %server, method = %method, "Server notification");
            }
        }
    }
}

/// Mask values of secret-looking keys for logging: first 4 chars, then `...`.
pub fn mask_secret(key: &str, value: &str) -> String {
    let upper = key.to_ascii_uppercase();
    let secret = ["KEY", "TOKEN", "SECRET", "PASSWORD", "AUTHORIZATION"]
        .iter()
        .any(|needle| upper.contains(needle));
    if !secret {
        return value.to_string();
    }
    let head: String = value.chars().take(4).collect();
    format!("{head}...")
}

/// Command-line arguments with `KEY=VALUE` pairs (docker `-e` flags,
/// `--token=...`) passed through [`mask_secret`].
pub fn masked_args(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((key, value)) => format!("{key}={}", mask_secret(key.trim_start_matches('-'), value)),
            None => arg.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask_secret("GITHUB_TOKEN", "ghp_abcdef123"), "ghp_...");
        assert_eq!(mask_secret("Authorization", "Bearer xyz"), "Bear...");
        assert_eq!(mask_secret("NODE_ENV", "production"), "production");
    }

    #[test]
    fn docker_env_flags_are_masked_in_args() {
        let args: Vec<String> = [
            "run",
            "-i",
            "--rm",
            "-e",
            "GITHUB_PERSONAL_ACCESS_TOKEN=ghp_supersecret",
            "-e",
            "LOG_LEVEL=debug",
            "--api-key=sk-live-123",
            "ghcr.io/github/github-mcp-server",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let masked = masked_args(&args);
        assert_eq!(masked[4], "GITHUB_PERSONAL_ACCESS_TOKEN=ghp_...");
        assert_eq!(masked[6], "LOG_LEVEL=debug");
        assert_eq!(masked[7], "--api-key=sk-l...");
        assert_eq!(masked[8], "ghcr.io/github/github-mcp-server");
        assert!(!format!("{masked:?}").contains("supersecret"));
    }

    #[tokio::test]
    async fn responses_are_routed_by_id() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(5, tx);

        route_line("t", "server booting...", &pending).await;
        route_line("t", r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#, &pending).await;
        assert_eq!(pending.lock().await.len(), 1);

        route_line("t", r#"{"jsonrpc":"2.0","id":5,"result":{"ok":true}}"#, &pending).await;
        let value = rx.await.unwrap().unwrap();
        assert_eq!(value["ok"], true);
        assert!(pending.lock().await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn closed_stdout_fails_fast_as_connection_error() {
        let launch = StdioCommand {
            command: "sh".into(),
            args: vec!["-c".into(), "exec >&-; sleep 30".into()],
            env: HashMap::new(),
            cwd: None,
        };
        let transport = StdioTransport::spawn("mute", &launch, Duration::from_secs(20))
            .await
            .unwrap();
        // Let the receive loop observe EOF.
        for _ in 0..50 {
            if transport.cancel.is_cancelled() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let started = std::time::Instant::now();
        let err = transport.request("tools/list", None).await.unwrap_err();
        assert!(err.is_connection_error(), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
        transport.close().await;
    }

    #[tokio::test]
    async fn missing_command_is_a_spawn_error() {
        let launch = StdioCommand {
            command: "definitely-not-a-real-mcp-server-binary".into(),
            args: vec![],
            env: HashMap::new(),
            cwd: None,
        };
        let err = StdioTransport::spawn("ghost", &launch, Duration::from_secs(1))
            .await
            .err()
            .expect("spawn should fail");
        assert!(matches!(err, McpError::SpawnFailed { .. }));
    }
}
