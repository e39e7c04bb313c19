//! Ollama chat backend (`POST {base_url}/api/chat`, non-streaming).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::LlmError;

use super::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider};

const PROVIDER: &str = "ollama";

/// Timeout used when a request doesn't carry its own.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Max error-body characters carried into an `HttpStatus` error.
const ERROR_BODY_CHARS: usize = 500;

/// Ollama REST client.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    stream: bool,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let timeout = request.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let body = ChatRequestBody {
            model: &self.model,
            stream: false,
            messages: &request.messages,
            options: request
                .temperature
                .map(|temperature| ChatOptions { temperature }),
        };

        debug!(model = %self.model, url = %self.chat_url(), "Sending chat request");

        let response = self
            .client
            .post(self.chat_url())
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Ollama returned an error status");
            return Err(LlmError::HttpStatus {
                provider: PROVIDER.into(),
                status: status.as_u16(),
                body: text.chars().take(ERROR_BODY_CHARS).collect(),
            });
        }

        let parsed: ChatResponseBody = response
            .json()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        let content = parsed
            .message
            .and_then(|m| m.content)
            .unwrap_or_default();

        Ok(CompletionResponse { content })
    }
}

fn map_transport_error(error: reqwest::Error, timeout: Duration) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout {
            provider: PROVIDER.into(),
            timeout,
        }
    } else if error.is_decode() {
        LlmError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: error.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider: PROVIDER.into(),
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_url_trims_trailing_slash() {
        let provider = OllamaProvider::new(&LlmConfig {
            base_url: "http://localhost:11434/".into(),
            model: "gemma2:2b".into(),
        });
        assert_eq!(provider.chat_url(), "http://localhost:11434/api/chat");
        assert_eq!(provider.model_name(), "gemma2:2b");
    }

    #[test]
    fn request_body_shape() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hello")];
        let body = ChatRequestBody {
            model: "llama3.1",
            stream: false,
            messages: &messages,
            options: Some(ChatOptions { temperature: 0.2 }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama3.1");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
        assert!((json["options"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn response_without_message_is_empty() {
        let parsed: ChatResponseBody = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert!(parsed.message.and_then(|m| m.content).is_none());
    }
}
