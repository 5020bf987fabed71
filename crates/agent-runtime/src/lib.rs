//! # agent-runtime
//!
//! Concrete LLM providers for agent-core.
//!
//! ## Providers
//!
//! - **Ollama** (default): Local LLM inference via Ollama
//! - **OpenAI-compatible**: any `/chat/completions` endpoint
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::ollama::OllamaProvider;
//!
//! let gateway = LlmGateway::with_provider(Arc::new(OllamaProvider::from_env()));
//! let agent = Agent::builder("Maurice")
//!     .role("IAM auditor")
//!     .gateway(gateway)
//!     .build()?;
//! ```

use std::sync::Arc;

#[cfg(feature = "ollama")]
pub mod ollama;
pub mod openai;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};

// Re-export core types for convenience
pub use agent_core::{AgentError, LlmProvider, Message, Result, Role};

/// Pick a provider by name (`ollama` or `openai`), configured from the
/// environment
pub fn provider_from_env(name: &str) -> Result<Arc<dyn LlmProvider>> {
    match name.trim().to_ascii_lowercase().as_str() {
        #[cfg(feature = "ollama")]
        "ollama" => Ok(Arc::new(OllamaProvider::from_env())),
        "openai" => Ok(Arc::new(OpenAiProvider::from_env()?)),
        other => Err(AgentError::Config(format!("unknown LLM provider '{other}'"))),
    }
}
