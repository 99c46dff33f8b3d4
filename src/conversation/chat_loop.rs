//! The interactive read-respond-print loop.
//!
//! Reads one line per turn, handles the built-in slash commands, and sends
//! everything else to the [`Supervisor`] together with the trimmed history.
//! Only `/exit` (or end of input) ends the loop; a failed turn prints
//! `Error: ...` and the next prompt is served.

use std::io::{BufRead, Write};

use crate::agent::logging::{LogEntry, Transcript, now_iso};
use crate::agent::supervisor::Supervisor;

use super::history::{History, HistoryLimit, Message, Role, trim};

const PROMPT: &str = "You: ";

const HELP: &str = "\
Commands:
  /exit    Exit the chat
  /help    Show this help
  /agents  List the available sub-agents
  /clear   Forget the conversation so far";

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The user typed `/exit`.
    Quit,
    /// Input was closed (Ctrl+D or end of a piped file).
    EndOfInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Exit,
    Help,
    Agents,
    Clear,
}

/// Built-in commands are matched case-insensitively on the whole line.
/// Any other `/word` is ordinary chat input.
fn parse_command(line: &str) -> Option<Command> {
    match line.to_ascii_lowercase().as_str() {
        "/exit" => Some(Command::Exit),
        "/help" => Some(Command::Help),
        "/agents" => Some(Command::Agents),
        "/clear" => Some(Command::Clear),
        _ => None,
    }
}

pub struct ChatLoop<S> {
    supervisor: S,
    history: History,
    limit: HistoryLimit,
    transcript: Transcript,
}

impl<S: Supervisor> ChatLoop<S> {
    pub fn new(supervisor: S, limit: HistoryLimit, transcript: Transcript) -> Self {
        Self {
            supervisor,
            history: History::new(),
            limit,
            transcript,
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Serve prompts until `/exit` or end of input.
    pub async fn run<R: BufRead, W: Write>(
        &mut self,
        mut input: R,
        output: &mut W,
    ) -> anyhow::Result<LoopExit> {
        let mut line = String::new();
        loop {
            write!(output, "{PROMPT}")?;
            output.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(output)?;
                return Ok(LoopExit::EndOfInput);
            }

            if let Some(exit) = self.handle_line(line.trim(), output).await? {
                return Ok(exit);
            }
        }
    }

    /// Process one already-trimmed input line. Returns `Some` when the loop
    /// should stop.
    pub async fn handle_line<W: Write>(
        &mut self,
        line: &str,
        output: &mut W,
    ) -> anyhow::Result<Option<LoopExit>> {
        if line.is_empty() {
            return Ok(None);
        }

        match parse_command(line) {
            Some(Command::Exit) => return Ok(Some(LoopExit::Quit)),
            Some(Command::Help) => writeln!(output, "{HELP}\n")?,
            Some(Command::Agents) => self.print_agents(output)?,
            Some(Command::Clear) => {
                self.history.clear();
                writeln!(output, "Conversation cleared.\n")?;
            }
            None => self.turn(line, output).await?,
        }
        Ok(None)
    }

    async fn turn<W: Write>(&mut self, line: &str, output: &mut W) -> anyhow::Result<()> {
        let turn = self.transcript.begin_turn();
        self.transcript.record(LogEntry::UserMessage {
            timestamp: now_iso(),
            turn,
            content: line.to_string(),
        });

        // The supervisor sees a trimmed view; the history itself only
        // changes once the turn succeeds.
        let mut candidate = self.history.messages().to_vec();
        candidate.push(Message::user(line));
        let view = trim(&candidate, &self.limit);
        if !view.iter().any(|m| m.role() == Role::User) {
            let message = "message does not fit in the history limit";
            self.transcript.error(message);
            writeln!(output, "\nError: {message}\n")?;
            return Ok(());
        }

        match self.supervisor.respond(&view).await {
            Ok(reply) => {
                self.transcript.record(LogEntry::AssistantReply {
                    timestamp: now_iso(),
                    turn,
                    content: reply.content().to_string(),
                });
                writeln!(output, "\nAssistant: {}\n", reply.content())?;
                self.history.push(Message::user(line));
                self.history.push(reply);
                self.enforce_limit(turn);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Turn failed");
                self.transcript.error(&e.to_string());
                writeln!(output, "\nError: {e}\n")?;
            }
        }
        Ok(())
    }

    fn enforce_limit(&mut self, turn: u64) {
        let evicted = self.history.enforce(&self.limit);
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.history.len(), "History trimmed");
            self.transcript.record(LogEntry::HistoryTrimmed {
                timestamp: now_iso(),
                turn,
                evicted,
                remaining: self.history.len(),
            });
        }
    }

    fn print_agents<W: Write>(&self, output: &mut W) -> std::io::Result<()> {
        let agents = self.supervisor.agents();
        if agents.is_empty() {
            return writeln!(output, "No sub-agents configured.\n");
        }
        writeln!(output, "Sub-agents:")?;
        for agent in agents {
            match agent.unavailable {
                None => writeln!(
                    output,
                    "  {:<12} {} tools  {}",
                    agent.name, agent.tool_count, agent.description
                )?,
                Some(reason) => writeln!(output, "  {:<12} unavailable: {reason}", agent.name)?,
            }
        }
        writeln!(output)
    }
}
