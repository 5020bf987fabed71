//! OpenAI-compatible LLM Provider
//!
//! Talks to any endpoint exposing `/chat/completions` (OpenAI, OpenRouter,
//! vLLM, Ollama's `/v1` shim).

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{Completion, GenerationOptions, LlmProvider, TokenUsage},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// Base URL without the trailing `/chat/completions`
    pub base_url: String,

    pub api_key: String,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl OpenAiConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AgentError::Config("OPENAI_API_KEY is not set".into()))?;
        let defaults = Self::default();
        Ok(Self {
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            api_key,
            timeout: defaults.timeout,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Provider for OpenAI-compatible chat endpoints
#[derive(Debug)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            client,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiConfig::from_env()?)
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage<'_>> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &m.content,
            })
            .collect()
    }

    fn transport_error(err: &reqwest::Error) -> AgentError {
        if err.is_timeout() || err.is_connect() {
            AgentError::ProviderUnavailable(err.to_string())
        } else {
            AgentError::Provider(err.to_string())
        }
    }

    /// Map an HTTP status to the error taxonomy
    fn status_error(status: u16, body: String) -> AgentError {
        match status {
            429 => AgentError::RateLimited(body),
            401 | 403 => AgentError::Auth("Invalid API key or insufficient permissions".into()),
            500..=599 => AgentError::ProviderUnavailable(format!("HTTP {status}: {body}")),
            _ => AgentError::Provider(format!("HTTP {status}: {body}")),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await;
        match response {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("OpenAI health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let body = ChatRequest {
            model: &options.model,
            messages: Self::to_api_messages(messages),
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
        };

        tracing::debug!(model = %options.model, messages = messages.len(), "Sending chat completion request");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %error_body, "Provider returned error");
            return Err(Self::status_error(status.as_u16(), error_body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("Failed to parse response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AgentError::Provider("No choices in response".into()))?;

        let model = if parsed.model.is_empty() {
            options.model.clone()
        } else {
            parsed.model
        };
        let completion = Completion::new(content, model);
        Ok(match parsed.usage {
            Some(usage) => {
                completion.with_usage(TokenUsage::new(usage.prompt_tokens, usage.completion_tokens))
            }
            None => completion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(OpenAiProvider::status_error(429, "slow down".into()).is_retryable());
        assert!(OpenAiProvider::status_error(503, String::new()).is_retryable());
        assert!(matches!(
            OpenAiProvider::status_error(401, String::new()),
            AgentError::Auth(_)
        ));
        assert!(!OpenAiProvider::status_error(400, "bad model".into()).is_retryable());
    }

    #[test]
    fn test_request_shape() {
        let messages = [Message::system("frame"), Message::user("Your goal: x")];
        let options = GenerationOptions::default();
        let body = ChatRequest {
            model: &options.model,
            messages: OpenAiProvider::to_api_messages(&messages),
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "Your goal: x");
        assert_eq!(value["max_tokens"], 1000);
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"model": "gpt-4o", "choices": [{"message": {"content": "{}"}}],
                      "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.model, "gpt-4o");
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 12);
    }

    #[test]
    fn test_base_url_trimmed() {
        let provider = OpenAiProvider::new(OpenAiConfig {
            base_url: "http://localhost:8000/v1/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(provider.base_url, "http://localhost:8000/v1");
    }
}
