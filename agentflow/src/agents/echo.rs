//! Deterministic offline agent. Useful for dry runs and pipeline tests.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{Agent, ChatMessage, GenerateOptions, Generation, Role};

const EMBEDDING_DIMS: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct EchoConfig {
    prefix: String,
}

/// Replies with the prompt (or last user message), optionally prefixed.
#[derive(Debug, Clone)]
pub struct EchoAgent {
    name: String,
    prefix: String,
}

impl EchoAgent {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(name: &str, config: &Map<String, Value>) -> Result<Self> {
        let cfg: EchoConfig = serde_json::from_value(Value::Object(config.clone()))?;
        Ok(Self::new(name, cfg.prefix))
    }

    fn reply(&self, text: &str, stream: bool) -> Generation {
        let full = format!("{}{}", self.prefix, text);
        if !stream {
            return Generation::Text(full);
        }
        let chunks: Vec<Result<String>> = full
            .split_inclusive(' ')
            .map(|chunk| Ok(chunk.to_string()))
            .collect();
        Generation::Stream(Box::new(chunks.into_iter()))
    }
}

impl Agent for EchoAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate_text(&self, prompt: &str, options: &GenerateOptions) -> Result<Generation> {
        Ok(self.reply(prompt, options.stream))
    }

    fn chat(&self, messages: &[ChatMessage], options: &GenerateOptions) -> Result<Generation> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(self.reply(last_user, options.stream))
    }

    /// Normalized byte histogram; stable across runs.
    fn embed(&self, input: &str) -> Result<Vec<f32>> {
        let mut buckets = [0f32; EMBEDDING_DIMS];
        for byte in input.bytes() {
            buckets[byte as usize % EMBEDDING_DIMS] += 1.0;
        }
        let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut buckets {
                *v /= norm;
            }
        }
        Ok(buckets.to_vec())
    }
}
