//! LLM provider client : the opaque text-in/text-out service
//! workers call once per probe.
//!
//! Uses `reqwest::Client` the same way an internal REST client would for
//! its own HTTP calls against a cluster API — `HttpLlmProvider` targets
//! `LLM_PROVIDER_URL` instead.

use crate::utils::error::OptimizerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// `complete` takes a static system prompt and a per-call dynamic prompt and
/// returns raw text; the worker is responsible for parsing it.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str, deadline: Instant) -> Result<String, OptimizerError>;
}

/// Chat-completions-shaped HTTP client against an OpenAI-compatible
/// endpoint, the same chat-completions request shape most LLM providers share.
pub struct HttpLlmProvider {
    client: reqwest::Client,
    provider_url: String,
    api_key: String,
    model: String,
}

impl HttpLlmProvider {
    pub fn new(provider_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), provider_url: provider_url.into(), api_key: api_key.into(), model: model.into() }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn complete(&self, system: &str, prompt: &str, deadline: Instant) -> Result<String, OptimizerError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        if timeout.is_zero() {
            return Err(OptimizerError::LlmTimeout);
        }

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "system", content: system }, ChatMessage { role: "user", content: prompt }],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.provider_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { OptimizerError::LlmTimeout } else { OptimizerError::LlmError(e.to_string()) })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(OptimizerError::LlmError(format!("provider returned {status}: {text}")));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| OptimizerError::LlmError(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| OptimizerError::LlmError("provider returned no choices".to_string()))
    }
}

/// Deadline helper: `now + remaining`, clamped so a probe's deadline never
/// exceeds the mission's ("worker deadlines <= mission deadline -
/// (gate+bench reserve)").
pub fn deadline_in(remaining: Duration) -> Instant {
    Instant::now() + remaining
}
