use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stratus_core::config::LlmConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no language model API key is configured (set STRATUS_LLM_API_KEY)")]
    MissingApiKey,
    #[error("language model rejected the credentials (HTTP {status})")]
    Authentication { status: u16 },
    #[error("could not reach the language model: {0}")]
    Connectivity(String),
    #[error("language model returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("language model response was malformed: {0}")]
    Malformed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One request/response round trip returning the model's text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Asks for a JSON object and parses the reply, falling back to a fenced block.
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value, LlmError> {
        let text =
            self.complete(&[ChatMessage::system(system), ChatMessage::user(user)]).await?;
        parse_json_response(&text)
    }
}

/// Parses a model reply as JSON, or the first fenced JSON block inside it.
pub fn parse_json_response(text: &str) -> Result<Value, LlmError> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(value);
    }

    let fenced = text
        .split("```")
        .skip(1)
        .step_by(2)
        .map(|block| block.trim_start_matches("json").trim_start_matches("JSON").trim())
        .find_map(|block| serde_json::from_str::<Value>(block).ok());
    if let Some(value) = fenced {
        return Ok(value);
    }
    Err(LlmError::Malformed(truncate(text, 200)))
}

/// Client for any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
    temperature: f32,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = match &config.api_key {
            Some(key) if !key.expose_secret().trim().is_empty() => key.clone(),
            _ => return Err(LlmError::MissingApiKey),
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Connectivity(error.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });

        tracing::debug!(
            event_name = "llm.request",
            model = %self.model,
            message_count = messages.len(),
            "sending completion request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| LlmError::Connectivity(error.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LlmError::Authentication { status: status.as_u16() });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), body: truncate(&body, 500) });
        }

        let parsed: CompletionResponse =
            response.json().await.map_err(|error| LlmError::Malformed(error.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Malformed("response has no message content".to_string()))
    }
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}
