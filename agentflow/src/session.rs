//! Direct agent access: one-shot generation and line-based chat.
//!
//! These back the `generate` and `chat` CLI commands. Streamed replies are
//! written chunk by chunk as the agent yields them.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::agents::{Agent, ChatMessage, GenerateOptions, Generation};

/// Typing this (any case) ends a chat session.
pub const EXIT_WORD: &str = "exit";

/// Write `generation` to `out`, flushing after every streamed chunk.
///
/// Returns the full reply. A trailing newline is written once the reply ends.
pub fn write_generation<W: Write>(generation: Generation, out: &mut W) -> Result<String> {
    let text = match generation {
        Generation::Text(text) => {
            out.write_all(text.as_bytes()).context("write reply")?;
            text
        }
        Generation::Stream(chunks) => {
            let mut text = String::new();
            for chunk in chunks {
                let chunk = chunk?;
                out.write_all(chunk.as_bytes()).context("write reply")?;
                out.flush().context("flush reply")?;
                text.push_str(&chunk);
            }
            text
        }
    };
    writeln!(out).context("write reply")?;
    out.flush().context("flush reply")?;
    Ok(text)
}

/// One-shot generation against `agent`.
#[instrument(skip_all, fields(agent = agent.name(), stream = options.stream))]
pub fn generate<W: Write>(
    agent: &dyn Agent,
    prompt: &str,
    options: &GenerateOptions,
    out: &mut W,
) -> Result<String> {
    let generation = agent.generate_text(prompt, options)?;
    write_generation(generation, out)
}

/// A conversation with one agent; every turn sends the whole history.
pub struct ChatSession {
    agent: Arc<dyn Agent>,
    options: GenerateOptions,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(agent: Arc<dyn Agent>, options: GenerateOptions) -> Self {
        let history = options
            .system_prompt
            .as_deref()
            .map(|system| vec![ChatMessage::system(system)])
            .unwrap_or_default();
        Self {
            agent,
            options,
            history,
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Send one user message and write the reply to `out`.
    ///
    /// A failed turn leaves the history as it was.
    pub fn send<W: Write>(&mut self, message: &str, out: &mut W) -> Result<String> {
        self.history.push(ChatMessage::user(message));
        let reply = self
            .agent
            .chat(&self.history, &self.options)
            .and_then(|generation| write_generation(generation, out));
        match reply {
            Ok(text) => {
                self.history.push(ChatMessage::assistant(text.clone()));
                Ok(text)
            }
            Err(err) => {
                self.history.pop();
                Err(err)
            }
        }
    }

    /// Read messages line by line from `input` until EOF or [`EXIT_WORD`].
    ///
    /// Blank lines are ignored. Agent errors are reported on `out` and the
    /// session continues. Returns the number of completed turns.
    #[instrument(skip_all, fields(agent = self.agent.name()))]
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<usize> {
        info!("chat session started");
        let mut turns = 0;
        let mut lines = input.lines();
        loop {
            write!(out, "> ").context("write prompt")?;
            out.flush().context("flush prompt")?;
            let Some(line) = lines.next() else {
                writeln!(out).context("write prompt")?;
                break;
            };
            let line = line.context("read message")?;
            let message = line.trim();
            if message.is_empty() {
                continue;
            }
            if message.eq_ignore_ascii_case(EXIT_WORD) {
                break;
            }
            match self.send(message, out) {
                Ok(_) => turns += 1,
                Err(err) => {
                    warn!(err = %format!("{err:#}"), "chat turn failed");
                    writeln!(out, "error: {err:#}").context("write error")?;
                }
            }
        }
        info!(turns, "chat session ended");
        Ok(turns)
    }
}
