//! Generation backends.
//!
//! - **[`ChatCompletionsGenerator`]** — any OpenAI-compatible
//!   `POST {base_url}/chat/completions` endpoint (Groq by default).
//! - **[`DisabledGenerator`]** — always errors; lets `gck ingest` and
//!   `gck query` run without an API key.
//!
//! Unlike the embedding providers, generation is never retried here: a
//! failed or slow call is reported to the caller, which owns the timeout.

use anyhow::bail;
use async_trait::async_trait;
use groundcheck_core::generation::{GenerationRequest, Generator};
use groundcheck_core::{Error, Result, Stage};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;

/// Create the [`Generator`] selected by `config.provider`.
///
/// The API key is read from the environment variable named by
/// `generation.api_key_env` (loaded from `.env` when present).
pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "openai-compatible" => Ok(Arc::new(ChatCompletionsGenerator::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledGenerator::new(
            "generation provider is disabled",
        ))),
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// A generator that always returns errors.
///
/// Also stands in for a configured backend that could not be created
/// (e.g. a missing API key), so the error surfaces only when generation
/// is actually requested.
pub struct DisabledGenerator {
    reason: String,
}

impl DisabledGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: &GenerationRequest) -> Result<String> {
        Err(Error::generation(self.reason.clone()))
    }
}

pub struct ChatCompletionsGenerator {
    endpoint: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl ChatCompletionsGenerator {
    /// # Errors
    ///
    /// Returns an error if the API key variable is unset or empty.
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        if api_key.trim().is_empty() {
            bail!(
                "{} environment variable not set (required by generation provider '{}')",
                config.api_key_env,
                config.provider
            );
        }
        // The synthesizers enforce the deadline; the client only needs a
        // connect bound.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            client,
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

pub(crate) fn request_body(model: &str, request: &GenerationRequest) -> serde_json::Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(serde_json::json!({ "role": "system", "content": system }));
    }
    messages.push(serde_json::json!({ "role": "user", "content": request.prompt }));
    serde_json::json!({
        "model": model,
        "messages": messages,
        "temperature": request.temperature,
    })
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body(&self.model, request))
            .send()
            .await
            .map_err(|e| Error::generation(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::generation(format!(
                "API error {}: {}",
                status, body_text
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::generation(format!("invalid chat response: {}", e)))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::generation("chat response has no content"))?;

        debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = content.len(),
            "generation complete"
        );
        Ok(content)
    }
}

/// Run one completion bounded by `timeout`.
///
/// Elapsed deadlines map to [`Error::GenerationTimeout`] for `stage`; the
/// call is made exactly once.
pub async fn complete_within(
    generator: &dyn Generator,
    request: &GenerationRequest,
    timeout: Duration,
    stage: Stage,
) -> Result<String> {
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, generator.complete(request)).await;
    match outcome {
        Ok(result) => {
            info!(
                %stage,
                model = generator.model_name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                ok = result.is_ok(),
                "generation backend returned"
            );
            result.map_err(|e| e.at_stage(stage))
        }
        Err(_) => {
            warn!(%stage, timeout_secs = timeout.as_secs_f64(), "generation backend timed out");
            Err(Error::GenerationTimeout { stage, timeout })
        }
    }
}
