//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference.

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{Completion, GenerationOptions, LlmProvider, TokenUsage},
};
use async_trait::async_trait;
use ollama_rs::{
    Ollama,
    error::OllamaError,
    generation::chat::{ChatMessage, ChatMessageResponse, MessageRole, request::ChatMessageRequest},
    models::ModelOptions,
};

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost".into());
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(11434);

        Self { host, port }
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: Ollama,
    config: OllamaConfig,
}

impl std::fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OllamaProvider {
    /// Create a new Ollama provider with custom host/port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_config(OllamaConfig {
            host: host.into(),
            port,
        })
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Self {
        Self {
            client: Ollama::new(config.host.clone(), config.port),
            config,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_config(OllamaConfig::from_env())
    }

    pub const fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Convert prompt messages to Ollama format
    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => MessageRole::System,
                    Role::User => MessageRole::User,
                    Role::Assistant => MessageRole::Assistant,
                };
                ChatMessage::new(role, m.content.clone())
            })
            .collect()
    }

    /// Token counts come from the final response's eval counters
    fn convert_completion(response: ChatMessageResponse, model: &str) -> Completion {
        let usage = response
            .final_data
            .as_ref()
            .and_then(|data| serde_json::to_value(data).ok())
            .map(|data| {
                let count = |key: &str| {
                    data.get(key)
                        .and_then(serde_json::Value::as_u64)
                        .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
                };
                TokenUsage::new(count("prompt_eval_count"), count("eval_count"))
            });

        let completion = Completion::new(response.message.content, model);
        match usage {
            Some(usage) => completion.with_usage(usage),
            None => completion,
        }
    }

    fn build_options(opts: &GenerationOptions) -> ModelOptions {
        ModelOptions::default()
            .temperature(opts.temperature)
            .top_p(opts.top_p)
            .num_predict(i32::try_from(opts.max_tokens).unwrap_or(i32::MAX))
    }

    /// Unreachable server and transport failures are worth retrying
    fn classify(err: &OllamaError) -> AgentError {
        let message = err.to_string();
        let lower = message.to_ascii_lowercase();
        if lower.contains("connect") || lower.contains("timed out") || lower.contains("sending request") {
            AgentError::ProviderUnavailable(message)
        } else {
            AgentError::Provider(message)
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.list_local_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let request = ChatMessageRequest::new(options.model.clone(), Self::convert_messages(messages))
            .options(Self::build_options(options));

        tracing::debug!(model = %options.model, messages = messages.len(), "Sending Ollama chat request");
        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| Self::classify(&e))?;

        Ok(Self::convert_completion(response, &options.model))
    }
}
