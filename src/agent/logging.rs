//! JSONL session transcript.
//!
//! When a log directory is configured, every chat turn is written as
//! structured events to `session-{timestamp}.jsonl` in that directory: the
//! user input, each delegation, each tool call and result, the reply, and
//! any error. One JSON object per line, flushed after each event.
//!
//! Uses synchronous `std::fs` since writes are small and append-only.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;

/// Current UTC time as ISO 8601 with milliseconds.
pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// A structured log entry serialized as a single JSON line.
#[derive(Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LogEntry {
    SessionStart {
        timestamp: String,
        model: String,
        agents: Vec<String>,
    },

    UserMessage {
        timestamp: String,
        turn: u64,
        content: String,
    },

    /// The supervisor handed a task to a sub-agent.
    Delegation {
        timestamp: String,
        turn: u64,
        agent: String,
        task: String,
    },

    ToolCall {
        timestamp: String,
        turn: u64,
        agent: String,
        call_id: String,
        fn_name: String,
        fn_arguments: serde_json::Value,
    },

    ToolResult {
        timestamp: String,
        turn: u64,
        agent: String,
        call_id: String,
        fn_name: String,
        result: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Token counts the provider reported for one model call.
    ModelUsage {
        timestamp: String,
        turn: u64,
        agent: String,
        prompt_tokens: usize,
        completion_tokens: usize,
    },

    AssistantReply {
        timestamp: String,
        turn: u64,
        content: String,
    },

    /// Messages were evicted to keep the history under its ceiling.
    HistoryTrimmed {
        timestamp: String,
        turn: u64,
        evicted: usize,
        remaining: usize,
    },

    Error {
        timestamp: String,
        turn: u64,
        message: String,
    },

    SessionEnd {
        timestamp: String,
        total_turns: u64,
        reason: String,
    },
}

/// Append-only JSONL writer for one session.
pub struct SessionLogger {
    writer: BufWriter<fs::File>,
    log_path: PathBuf,
}

impl SessionLogger {
    /// Create `session-{timestamp}.jsonl` inside `log_dir` (created if
    /// missing). Colons in the timestamp are replaced for filesystem safety.
    pub fn new(log_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let session_id = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3f").to_string();
        let log_path = log_dir.join(format!("session-{session_id}.jsonl"));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            log_path,
        })
    }

    /// Serialize a log entry as a single JSON line and flush.
    pub fn log_event(&mut self, event: &LogEntry) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// Cheap, cloneable handle the chat loop and agents share. A disabled
/// transcript records nothing; write failures are logged and swallowed so
/// the transcript can never break a chat turn.
#[derive(Clone, Default)]
pub struct Transcript {
    logger: Option<Arc<Mutex<SessionLogger>>>,
    turn: Arc<AtomicU64>,
}

impl Transcript {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(logger: SessionLogger) -> Self {
        Self {
            logger: Some(Arc::new(Mutex::new(logger))),
            turn: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.logger.is_some()
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        let logger = self.logger.as_ref()?;
        let guard = logger.lock().ok()?;
        Some(guard.log_path().to_path_buf())
    }

    /// Advance to the next turn and return its number (1-based).
    pub fn begin_turn(&self) -> u64 {
        self.turn.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn turn(&self) -> u64 {
        self.turn.load(Ordering::SeqCst)
    }

    pub fn record(&self, event: LogEntry) {
        let Some(logger) = &self.logger else {
            return;
        };
        let result = match logger.lock() {
            Ok(mut guard) => guard.log_event(&event),
            Err(_) => Err(anyhow::anyhow!("session logger lock poisoned")),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to write session log");
        }
    }

    pub fn session_start(&self, model: &str, agents: Vec<String>) {
        self.record(LogEntry::SessionStart {
            timestamp: now_iso(),
            model: model.to_string(),
            agents,
        });
    }

    pub fn model_usage(&self, agent: &str, prompt_tokens: usize, completion_tokens: usize) {
        tracing::debug!(agent = %agent, prompt_tokens, completion_tokens, "Model usage");
        self.record(LogEntry::ModelUsage {
            timestamp: now_iso(),
            turn: self.turn(),
            agent: agent.to_string(),
            prompt_tokens,
            completion_tokens,
        });
    }

    pub fn error(&self, message: &str) {
        self.record(LogEntry::Error {
            timestamp: now_iso(),
            turn: self.turn(),
            message: message.to_string(),
        });
    }

    pub fn session_end(&self, reason: &str) {
        self.record(LogEntry::SessionEnd {
            timestamp: now_iso(),
            total_turns: self.turn(),
            reason: reason.to_string(),
        });
    }
}
