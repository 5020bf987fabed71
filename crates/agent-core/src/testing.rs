//! Test Doubles
//!
//! A scripted [`LlmProvider`] for driving agents deterministically in tests
//! and demos.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{Completion, GenerationOptions, LlmProvider, TokenUsage};

/// Provider that replays a fixed queue of responses and records every prompt
/// it receives.
///
/// ```
/// use agent_core::testing::ScriptedProvider;
///
/// let provider = ScriptedProvider::new([
///     r#"{"action": "goal_complete", "summary": "done"}"#,
/// ]);
/// assert_eq!(provider.remaining(), 1);
/// ```
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<Vec<Message>>>,
    usage: Option<TokenUsage>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            ..Default::default()
        }
    }

    /// Fail the next call with `err` before replaying the script
    #[must_use]
    pub fn fail_first(self, err: AgentError) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_front(Err(err));
        self
    }

    /// Append a failure after the scripted responses
    #[must_use]
    pub fn then_fail(self, err: AgentError) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(err));
        self
    }

    /// Report this usage on every completion instead of leaving it to estimation
    #[must_use]
    pub const fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Wait this long before answering
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every prompt received so far
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Responses not yet consumed
    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let content = next.unwrap_or_else(|| {
            Err(AgentError::Provider("scripted provider has no responses left".into()))
        })?;

        let completion = Completion::new(content, options.model.clone());
        Ok(match self.usage {
            Some(usage) => completion.with_usage(usage),
            None => completion,
        })
    }
}
