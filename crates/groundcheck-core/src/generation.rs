//! Generation backend trait.
//!
//! A text-in/text-out completion interface. Concrete backends (the
//! OpenAI-compatible chat client) live in the `groundcheck` app crate;
//! tests substitute scripted implementations.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// A single completion request: an optional system preamble plus the
/// user prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.1,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Render the request as plain text, for `--prompt-only` output and logs.
    pub fn render(&self) -> String {
        match &self.system {
            Some(system) => format!("[system]\n{}\n\n[user]\n{}", system, self.prompt),
            None => self.prompt.clone(),
        }
    }
}

/// Trait for generation backends.
///
/// One call, one response: implementations must not retry internally and
/// need not enforce a deadline (callers wrap calls in their own timeout).
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"llama-3.3-70b-versatile"`).
    fn model_name(&self) -> &str;
    async fn complete(&self, request: &GenerationRequest) -> Result<String>;
}
