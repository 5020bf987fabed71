//! LLM Gateway
//!
//! The single path from an agent to the model: one rate limiter, one cost
//! meter and one provider, shared by every agent in a team. Created once with
//! [`LlmGateway::init`] and closed with [`LlmGateway::shutdown`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cost::{CostMeter, CostSummary, PriceTable};
use crate::error::Result;
use crate::limiter::{RateLimitConfig, RateLimiter};
use crate::message::{Message, estimate_prompt_tokens, estimate_tokens};
use crate::provider::{Completion, GenerationOptions, LlmProvider, TokenUsage};

pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    limiter: RateLimiter,
    meter: CostMeter,
}

impl std::fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGateway")
            .field("provider", &self.provider.name())
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl LlmGateway {
    pub fn init(
        provider: Arc<dyn LlmProvider>,
        limits: RateLimitConfig,
        prices: PriceTable,
    ) -> Arc<Self> {
        tracing::info!(
            provider = provider.name(),
            max_calls = limits.max_calls,
            window_secs = limits.window.as_secs(),
            "LLM gateway ready"
        );
        Arc::new(Self {
            provider,
            limiter: RateLimiter::new(limits),
            meter: CostMeter::new(prices),
        })
    }

    /// Gateway with default limits and prices
    pub fn with_provider(provider: Arc<dyn LlmProvider>) -> Arc<Self> {
        Self::init(provider, RateLimitConfig::default(), PriceTable::default())
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub const fn meter(&self) -> &CostMeter {
        &self.meter
    }

    pub fn usage(&self) -> CostSummary {
        self.meter.summary()
    }

    /// Wait for a permit, call the model and meter the result.
    ///
    /// Every completion that comes back is metered, whether or not its text
    /// turns out to be a usable decision. Usage the provider does not report
    /// is estimated from the text.
    pub async fn complete(
        &self,
        agent: &str,
        messages: &[Message],
        options: &GenerationOptions,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        let permit = self.limiter.acquire_with(cancel).await?;
        let completion = self.provider.complete(messages, options).await;
        drop(permit);
        let completion = completion?;

        let usage = completion.usage.unwrap_or_else(|| {
            TokenUsage::new(
                estimate_prompt_tokens(messages),
                estimate_tokens(&completion.content),
            )
        });
        let model = if completion.model.is_empty() {
            options.model.as_str()
        } else {
            completion.model.as_str()
        };
        let key = format!("{}/{model}", self.provider.name());
        self.meter
            .record(agent, &key, usage.prompt_tokens, usage.completion_tokens);

        Ok(completion)
    }

    /// Stop handing out permits; waiting agents fail with `LimiterClosed`
    pub fn shutdown(&self) {
        tracing::info!("LLM gateway shutting down");
        self.limiter.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.limiter.is_shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::testing::ScriptedProvider;

    #[tokio::test]
    async fn test_complete_meters_estimated_usage() {
        let provider = Arc::new(ScriptedProvider::new(["{\"action\": \"goal_complete\"}"]));
        let gateway = LlmGateway::with_provider(provider);

        let messages = [Message::user("hello there")];
        let completion = gateway
            .complete("A", &messages, &GenerationOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(completion.content.contains("goal_complete"));

        let usage = gateway.usage();
        assert_eq!(usage.calls, 1);
        assert!(usage.tokens > 0);
        assert!(usage.by_model.contains_key("scripted/llama3.2"));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_calls() {
        let gateway = LlmGateway::with_provider(Arc::new(ScriptedProvider::new(["x"])));
        gateway.shutdown();
        let err = gateway
            .complete("A", &[], &GenerationOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::LimiterClosed));
        assert_eq!(gateway.usage().calls, 0);
    }
}
