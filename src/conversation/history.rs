//! Conversation history and the trimming policy that keeps it inside the
//! model's context budget.
//!
//! Sizes are estimated with the 1 token ~ 4 chars heuristic plus a small
//! fixed overhead per message for role and framing tokens. [`trim`] is a pure
//! function so the eviction policy can be tested without any I/O.

use genai::chat::ChatMessage;
use serde::Serialize;

/// Fixed per-message token overhead (role marker, separators).
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Suffix appended to a message whose content had to be cut to fit.
pub const TRUNCATION_MARKER: &str = "…[truncated]";

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single conversation message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Estimated token cost of this message.
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.content) + MESSAGE_OVERHEAD_TOKENS
    }

    /// Convert to a genai chat message for a model request.
    ///
    /// Tool messages carry no call id at this level, so they are replayed to
    /// the model as user-visible tool output.
    pub fn to_chat_message(&self) -> ChatMessage {
        match self.role {
            Role::System => ChatMessage::system(self.content.as_str()),
            Role::User => ChatMessage::user(self.content.as_str()),
            Role::Assistant => ChatMessage::assistant(self.content.as_str()),
            Role::Tool => ChatMessage::user(format!("[tool output]\n{}", self.content)),
        }
    }
}

/// Estimate tokens for a piece of text (1 token ~ 4 chars, rounded up).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Ceiling for the history handed to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimit {
    /// Maximum estimated tokens across all messages.
    pub max_tokens: usize,
    /// Maximum number of messages.
    pub max_messages: usize,
}

impl Default for HistoryLimit {
    fn default() -> Self {
        Self {
            max_tokens: 24_000,
            max_messages: 40,
        }
    }
}

/// Total estimated tokens for a slice of messages.
pub fn total_tokens(messages: &[Message]) -> usize {
    messages.iter().map(Message::estimated_tokens).sum()
}

/// Reduce `history` so it fits inside `limit`.
///
/// - System messages are never evicted or altered.
/// - Oldest non-system messages go first.
/// - A conversation never starts with an assistant or tool message: those are
///   evicted once their preceding user message is gone.
/// - If the newest message alone is still too large, its content is cut on a
///   char boundary and suffixed with [`TRUNCATION_MARKER`].
pub fn trim(history: &[Message], limit: &HistoryLimit) -> Vec<Message> {
    let (system_tokens, system_count) = history
        .iter()
        .filter(|m| m.role == Role::System)
        .fold((0, 0), |(tokens, count), m| (tokens + m.estimated_tokens(), count + 1));

    // Positions of evictable messages, oldest first.
    let rest: Vec<usize> = history
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role != Role::System)
        .map(|(i, _)| i)
        .collect();
    let mut rest_tokens: usize = rest.iter().map(|&i| history[i].estimated_tokens()).sum();

    let fits = |tokens: usize, count: usize| {
        system_tokens + tokens <= limit.max_tokens && system_count + count <= limit.max_messages
    };

    // FIFO eviction, but always keep the newest message for the truncation step.
    let mut start = 0;
    while rest.len() - start > 1 && !fits(rest_tokens, rest.len() - start) {
        rest_tokens -= history[rest[start]].estimated_tokens();
        start += 1;
    }
    // Drop orphaned replies at the head.
    while rest.len() - start > 1 && history[rest[start]].role != Role::User {
        rest_tokens -= history[rest[start]].estimated_tokens();
        start += 1;
    }
    let remaining = rest.len() - start;
    let first_survivor = rest.get(start).copied().unwrap_or(history.len());

    let mut kept: Vec<Message> = history
        .iter()
        .enumerate()
        .filter(|(i, m)| m.role == Role::System || *i >= first_survivor)
        .map(|(_, m)| m.clone())
        .collect();

    if fits(rest_tokens, remaining) {
        return kept;
    }

    // Only the newest non-system message is left and it is still too big.
    let Some(last_idx) = kept.iter().rposition(|m| m.role != Role::System) else {
        return kept;
    };
    if system_count + 1 > limit.max_messages {
        kept.remove(last_idx);
        return kept;
    }
    let budget = limit
        .max_tokens
        .saturating_sub(system_tokens)
        .saturating_sub(MESSAGE_OVERHEAD_TOKENS);
    match truncate_to_tokens(kept[last_idx].content(), budget) {
        Some(content) => {
            let role = kept[last_idx].role;
            kept[last_idx] = Message::new(role, content);
        }
        None => {
            kept.remove(last_idx);
        }
    }
    kept
}

/// Cut `content` so that it (plus the truncation marker) fits in
/// `budget_tokens`. Returns `None` when not even the marker fits.
fn truncate_to_tokens(content: &str, budget_tokens: usize) -> Option<String> {
    let marker_chars = TRUNCATION_MARKER.chars().count();
    let max_chars = budget_tokens * 4;
    if max_chars <= marker_chars {
        return None;
    }
    let keep = max_chars - marker_chars;
    let mut out: String = content.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    Some(out)
}

/// The in-process conversation history owned by the chat loop.
#[derive(Debug, Clone, Default)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Remove and return the newest message.
    pub fn pop(&mut self) -> Option<Message> {
        self.messages.pop()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn estimated_tokens(&self) -> usize {
        total_tokens(&self.messages)
    }

    /// Drop every non-system message.
    pub fn clear(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
    }

    /// Apply [`trim`] in place. Returns how many messages were evicted.
    pub fn enforce(&mut self, limit: &HistoryLimit) -> usize {
        let before = self.messages.len();
        self.messages = trim(&self.messages, limit);
        before - self.messages.len()
    }
}
