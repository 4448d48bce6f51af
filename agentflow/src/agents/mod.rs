//! Agent capability: prompt/messages in, generated text (or embeddings) out.
//!
//! Provider SDKs are out of scope. The built-in agents are [`echo::EchoAgent`]
//! (deterministic, offline) and [`process::ProcessAgent`], which delegates to
//! any local CLI that reads a prompt on stdin and writes the reply to stdout.

use std::fmt;
use std::time::Instant;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod echo;
pub mod process;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call generation settings.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub stream: bool,
    pub system_prompt: Option<String>,
    /// Provider parameters (`temperature`, `max_tokens`, ...), passed through.
    pub params: Map<String, Value>,
    /// Absolute deadline for the call; agents that block on I/O must honor it.
    pub deadline: Option<Instant>,
}

/// Agent reply: a complete text, or a lazy sequence of chunks when streaming.
pub enum Generation {
    Text(String),
    Stream(Box<dyn Iterator<Item = Result<String>> + Send>),
}

impl Generation {
    /// Collect the reply into one string, draining a stream if needed.
    pub fn into_text(self) -> Result<String> {
        match self {
            Generation::Text(text) => Ok(text),
            Generation::Stream(chunks) => chunks.collect(),
        }
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Generation::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Capability surface every agent exposes to plugins, commands and the planner.
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn generate_text(&self, prompt: &str, options: &GenerateOptions) -> Result<Generation>;

    fn chat(&self, messages: &[ChatMessage], options: &GenerateOptions) -> Result<Generation>;

    fn embed(&self, _input: &str) -> Result<Vec<f32>> {
        Err(anyhow!("agent '{}' does not support embeddings", self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_collects_chunks_in_order() {
        let chunks = vec![Ok("a".to_string()), Ok("b".to_string()), Ok("c".to_string())];
        let generation = Generation::Stream(Box::new(chunks.into_iter()));
        assert_eq!(generation.into_text().expect("text"), "abc");
    }

    #[test]
    fn stream_surfaces_chunk_errors() {
        let chunks = vec![Ok("a".to_string()), Err(anyhow!("connection reset"))];
        let generation = Generation::Stream(Box::new(chunks.into_iter()));
        let err = generation.into_text().unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }
}
