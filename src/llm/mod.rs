//! LLM integration for inbox triage.
//!
//! The triage pipeline talks to an [`LlmProvider`]; the only shipped
//! backend is [`OllamaProvider`], which speaks Ollama's `/api/chat`.
//! [`complete_json`] wraps a provider call with the strict-then-repair
//! JSON extraction in [`json`].

pub mod json;
pub mod ollama;

pub use json::{ModelJson, parse_model_json};
pub use ollama::OllamaProvider;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::LlmError;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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
}

/// A non-streaming completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub timeout: Option<Duration>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            timeout: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Assistant text returned by a provider.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
}

/// A chat-completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier used for requests.
    fn model_name(&self) -> &str;

    /// Send the conversation and return the assistant's text.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Send a system + user prompt pair and return the parsed JSON object.
///
/// Prose around the object is tolerated; anything unrecoverable becomes
/// [`LlmError::MalformedJson`].
pub async fn complete_json(
    llm: &dyn LlmProvider,
    system_prompt: &str,
    user_prompt: &str,
    temperature: f32,
    timeout: Duration,
) -> Result<Map<String, Value>, LlmError> {
    let request = CompletionRequest::new(vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(user_prompt),
    ])
    .with_temperature(temperature)
    .with_timeout(timeout);

    let response = llm.complete(request).await?;
    debug!(
        model = llm.model_name(),
        chars = response.content.len(),
        "Model responded"
    );

    match parse_model_json(&response.content) {
        ModelJson::Parsed(object) => Ok(object),
        ModelJson::Malformed { excerpt } => Err(LlmError::MalformedJson { excerpt }),
    }
}
