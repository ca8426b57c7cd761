//! Console-driven agent.
//!
//! All interactive drivers share one [`Console`]; its lock serializes prompts
//! so two humans never read from the same line, while other drivers keep
//! running concurrently.

use crate::Driver;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use turnsim::{AgentAction, TurnResult, WorldState};

struct ConsoleIo {
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

/// Line-based input/output shared by interactive drivers.
pub struct Console {
    io: Mutex<ConsoleIo>,
}

impl Console {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            io: Mutex::new(ConsoleIo {
                reader: Box::new(reader),
                writer: Box::new(writer),
            }),
        }
    }

    /// Process stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }

    /// Writes `text` and reads one line back (without the line ending).
    pub async fn prompt(&self, text: &str) -> Result<String> {
        let mut io = self.io.lock().await;
        io.writer
            .write_all(text.as_bytes())
            .await
            .context("Failed to write prompt")?;
        io.writer.flush().await.context("Failed to flush console")?;

        let mut line = String::new();
        let read = io
            .reader
            .read_line(&mut line)
            .await
            .context("Failed to read console input")?;
        if read == 0 {
            bail!("Console input closed");
        }

        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    pub async fn print(&self, text: &str) -> Result<()> {
        let mut io = self.io.lock().await;
        io.writer
            .write_all(text.as_bytes())
            .await
            .context("Failed to write to console")?;
        io.writer.flush().await.context("Failed to flush console")?;
        Ok(())
    }
}

/// Parses one console command into an action.
///
/// `TAKE <target>`, `TALK <message...>`; anything else is `WAIT`. The verb
/// is case-insensitive.
pub fn parse_command(agent_id: &str, line: &str) -> AgentAction {
    let line = line.trim();
    let (verb, rest) = match line.split_once(' ') {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb.to_uppercase().as_str() {
        "TAKE" => {
            let action = AgentAction::new(agent_id, "TAKE");
            if rest.is_empty() {
                action
            } else {
                action.with_target(rest)
            }
        }
        "TALK" => AgentAction::talk(agent_id, if rest.is_empty() { "..." } else { rest }),
        _ => AgentAction::wait(agent_id),
    }
}

pub struct InteractiveDriver {
    agent_id: String,
    console: Arc<Console>,
}

impl InteractiveDriver {
    pub fn new(agent_id: impl Into<String>, console: Arc<Console>) -> Self {
        Self {
            agent_id: agent_id.into(),
            console,
        }
    }
}

#[async_trait]
impl Driver for InteractiveDriver {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn kind(&self) -> &str {
        "interactive"
    }

    async fn get_action(&mut self, state: &WorldState) -> Result<AgentAction> {
        let names: Vec<&str> = state.entities.iter().map(|e| e.name.as_str()).collect();
        let text = format!(
            "\n[{agent}] Your turn.\n  Room: {room}\n  Entities: {entities}\n  Action for {agent} (TAKE <id> | TALK <msg> | WAIT): ",
            agent = self.agent_id,
            room = state.room_id,
            entities = names.join(", "),
        );

        let line = self.console.prompt(&text).await?;
        Ok(parse_command(&self.agent_id, &line))
    }

    async fn receive_feedback(&mut self, result: &TurnResult) -> Result<()> {
        self.console
            .print(&format!(
                "\n[{}] Turn {}: {}\n",
                self.agent_id, result.turn_id, result.narrative
            ))
            .await
    }
}
