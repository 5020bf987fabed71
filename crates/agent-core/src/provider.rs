//! LLM Provider Strategy Pattern
//!
//! Defines a common interface for all LLM providers (Ollama, OpenAI-compatible
//! endpoints, scripted test doubles) so the reasoning engine works with any
//! backend without code changes.
//!
//! One call is one `complete`: the rendered prompt goes in, raw text that is
//! expected to encode a single decision comes out. Everything else (parsing,
//! retries, metering) lives in the engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "llama3.2", "gpt-4o")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

const fn default_temperature() -> f32 { 0.7 }
const fn default_max_tokens() -> u32 { 1000 }
const fn default_top_p() -> f32 { 0.9 }

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
        }
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub content: String,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,
}

impl Completion {
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            usage: None,
        }
    }

    pub const fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Token usage statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub const fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The engine works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name for logs (e.g. "ollama")
    fn name(&self) -> &str;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Generate a completion from messages
    ///
    /// Throttling and transient transport failures should surface as
    /// `AgentError::RateLimited` / `AgentError::ProviderUnavailable` so the
    /// engine can retry them.
    async fn complete(&self, messages: &[Message], options: &GenerationOptions)
        -> Result<Completion>;

    /// Estimate token count for text (provider-specific tokenization)
    fn estimate_tokens(&self, text: &str) -> u32 {
        crate::message::estimate_tokens(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens, 1000);
        assert_eq!(opts.model, "llama3.2");
    }

    #[test]
    fn test_usage_total_saturates() {
        assert_eq!(TokenUsage::new(10, 5).total(), 15);
        assert_eq!(TokenUsage::new(u32::MAX, 1).total(), u32::MAX);
    }
}
