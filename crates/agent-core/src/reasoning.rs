//! Reasoning Engine
//!
//! One decision per call: render the agent's framing and transcript into a
//! prompt, make a single metered LLM call, and parse the response into a
//! [`Decision`]. Responses that fail to parse are written back into memory as
//! feedback and the call is retried, up to `max_retries` extra attempts.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::decision::Decision;
use crate::error::{AgentError, Result};
use crate::gateway::LlmGateway;
use crate::knowledge::{KnowledgeProvider, NoKnowledge};
use crate::memory::{KeepAll, MemoryStore, TrimPolicy, Turn};
use crate::message::Message;
use crate::provider::GenerationOptions;
use crate::tool::ToolRegistry;

/// Engine configuration
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Generation options passed to the provider
    pub generation: GenerationOptions,

    /// Extra attempts after a response that cannot be parsed
    pub max_retries: usize,

    /// Deadline for one decision, retries included
    pub step_timeout: Option<Duration>,

    /// Base delay before retrying a throttled or unavailable provider
    pub retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generation: GenerationOptions::default(),
            max_retries: 3,
            step_timeout: Some(Duration::from_secs(120)),
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut generation = defaults.generation;
        if let Ok(model) = std::env::var("AGENT_MODEL") {
            generation.model = model;
        }
        if let Some(temperature) = env_parse("AGENT_TEMPERATURE") {
            generation.temperature = temperature;
        }
        if let Some(max_tokens) = env_parse("AGENT_MAX_TOKENS") {
            generation.max_tokens = max_tokens;
        }

        Self {
            generation,
            max_retries: env_parse("AGENT_MAX_RETRIES").unwrap_or(defaults.max_retries),
            step_timeout: env_parse::<u64>("AGENT_STEP_TIMEOUT_SECS")
                .map(|secs| (secs > 0).then(|| Duration::from_secs(secs)))
                .unwrap_or(defaults.step_timeout),
            retry_backoff: env_parse("AGENT_RETRY_BACKOFF_MS")
                .map_or(defaults.retry_backoff, Duration::from_millis),
        }
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.generation.model = model.into();
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Who is asking: the engine's view of an agent
#[derive(Clone, Copy, Debug)]
pub struct Persona<'a> {
    pub name: &'a str,
    pub role: &'a str,
}

/// Turns an agent's context into decisions
pub struct ReasoningEngine {
    gateway: Arc<LlmGateway>,
    config: EngineConfig,
    knowledge: Arc<dyn KnowledgeProvider>,
    trim: Arc<dyn TrimPolicy>,
}

impl std::fmt::Debug for ReasoningEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasoningEngine")
            .field("gateway", &self.gateway)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReasoningEngine {
    pub fn new(gateway: Arc<LlmGateway>, config: EngineConfig) -> Self {
        Self {
            gateway,
            config,
            knowledge: Arc::new(NoKnowledge),
            trim: Arc::new(KeepAll),
        }
    }

    #[must_use]
    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeProvider>) -> Self {
        self.knowledge = knowledge;
        self
    }

    #[must_use]
    pub fn with_trim_policy(mut self, trim: Arc<dyn TrimPolicy>) -> Self {
        self.trim = trim;
        self
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<LlmGateway> {
        &self.gateway
    }

    /// Obtain one valid decision, within the step deadline
    pub async fn decide(
        &self,
        persona: Persona<'_>,
        tools: &ToolRegistry,
        memory: &mut MemoryStore,
        cancel: &CancellationToken,
    ) -> Result<Decision> {
        let attempt = self.decide_with_retries(persona, tools, memory, cancel);
        match self.config.step_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .map_err(|_| AgentError::StepTimeout(limit))?,
            None => attempt.await,
        }
    }

    async fn decide_with_retries(
        &self,
        persona: Persona<'_>,
        tools: &ToolRegistry,
        memory: &mut MemoryStore,
        cancel: &CancellationToken,
    ) -> Result<Decision> {
        let attempts = self.config.max_retries + 1;
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            let messages = self.build_prompt(persona, tools, memory);
            let completion = match self
                .gateway
                .complete(persona.name, &messages, &self.config.generation, cancel)
                .await
            {
                Ok(completion) => completion,
                Err(err) if err.is_retryable() && attempt < attempts => {
                    tracing::warn!(agent = persona.name, attempt, error = %err, "Provider call failed, retrying");
                    let backoff = self
                        .config
                        .retry_backoff
                        .saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX));
                    tokio::select! {
                        () = cancel.cancelled() => return Err(AgentError::Cancelled),
                        () = tokio::time::sleep(backoff) => {}
                    }
                    continue;
                }
                Err(err) => return Err(err),
            };

            memory.append(Turn::decision(completion.content.clone()));

            match Decision::parse_for(&completion.content, tools) {
                Ok(decision) => {
                    tracing::debug!(agent = persona.name, action = decision.action(), attempt, "Decision parsed");
                    return Ok(decision);
                }
                Err(reason) => {
                    tracing::warn!(agent = persona.name, attempt, %reason, "Unparseable decision");
                    memory.append(Turn::observation(parse_failure_observation(&reason)));
                    last_reason = reason;
                }
            }
        }

        Err(AgentError::DecisionParse {
            attempts,
            reason: last_reason,
        })
    }

    /// System framing followed by the (trimmed) transcript
    pub fn build_prompt(
        &self,
        persona: Persona<'_>,
        tools: &ToolRegistry,
        memory: &MemoryStore,
    ) -> Vec<Message> {
        let mut messages = vec![Message::system(self.system_framing(persona, tools))];
        messages.extend(
            self.trim
                .trim(memory.snapshot())
                .iter()
                .map(Turn::to_message),
        );
        messages
    }

    /// Identity, contract, tools, knowledge and response shapes
    pub fn system_framing(&self, persona: Persona<'_>, tools: &ToolRegistry) -> String {
        let mut prompt = format!("You are {}, a {}.\n\n", persona.name, persona.role);
        prompt.push_str(AGENT_CONTRACT);
        prompt.push_str("\n\n## Available Tools\n\n");
        prompt.push_str(&tools.generate_prompt_section());

        if let Some(knowledge) = self.knowledge.get(persona.name) {
            let knowledge = knowledge.trim();
            if !knowledge.is_empty() {
                let _ = write!(prompt, "\n## Knowledge\n\n{knowledge}\n");
            }
        }

        prompt.push('\n');
        prompt.push_str(RESPONSE_FORMAT);
        prompt
    }
}

const AGENT_CONTRACT: &str = "You are an autonomous agent. You reason independently, \
choose one action at a time, see its result, and keep going until your goal is achieved. \
Adapt your approach when a tool fails or returns something unexpected. \
Always explain your reasoning.";

const RESPONSE_FORMAT: &str = r#"## Response Format

Respond with exactly one JSON object and nothing else.

To use a tool:
{"action": "use_tool", "tool": "tool_name", "parameters": {"param": "value"}, "reasoning": "why this tool"}

To record findings or analysis:
{"action": "document", "content": "your findings", "reasoning": "your thought process"}

To message another agent:
{"action": "send_message", "to": "agent name", "message": "what you need to tell them"}

When the goal is achieved:
{"action": "goal_complete", "summary": "what you accomplished", "next_steps": "follow-up needed, if any"}
"#;

/// Goal turn text
pub fn goal_prompt(goal: &str) -> String {
    format!("Your goal: {goal}\n\nThink step by step about how to achieve this goal. What should you do first?")
}

/// Observation after a successful tool call
pub fn tool_success_observation(tool: &str, rendered: &str) -> String {
    format!("Tool '{tool}' executed successfully.\n\nResult:\n{rendered}\n\nWhat should you do next?")
}

/// Observation after a failed tool call
pub fn tool_failure_observation(tool: &str, err: &AgentError) -> String {
    let detail = match err {
        AgentError::ToolExecution { message, .. } => message.clone(),
        other => other.to_string(),
    };
    format!("Tool '{tool}' failed: {detail}\n\nTry a different approach or different parameters.")
}

/// Observation fed back after an unparseable response
pub fn parse_failure_observation(reason: &str) -> String {
    format!(
        "Your last response could not be parsed because {reason}; \
         respond again in the required structure."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::StaticKnowledge;
    use crate::memory::{CompressOldest, TurnRole};
    use crate::message::Role;
    use crate::testing::ScriptedProvider;

    fn engine(provider: Arc<ScriptedProvider>, max_retries: usize) -> ReasoningEngine {
        ReasoningEngine::new(
            LlmGateway::with_provider(provider),
            EngineConfig::default().with_max_retries(max_retries),
        )
    }

    const PERSONA: Persona<'static> = Persona {
        name: "Maurice",
        role: "IAM auditor",
    };

    #[tokio::test]
    async fn test_retry_after_parse_failure_feeds_reason_back() {
        let provider = Arc::new(ScriptedProvider::new([
            "I think I'm done",
            r#"{"action": "goal_complete", "summary": "done"}"#,
        ]));
        let engine = engine(Arc::clone(&provider), 3);
        let mut memory = MemoryStore::new();
        memory.append(Turn::goal(goal_prompt("finish")));

        let decision = engine
            .decide(PERSONA, &ToolRegistry::new(), &mut memory, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(decision, Decision::GoalComplete { .. }));

        let roles: Vec<_> = memory.snapshot().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            [TurnRole::Goal, TurnRole::Decision, TurnRole::Observation, TurnRole::Decision]
        );
        assert!(memory.snapshot()[2].content.contains("could not be parsed because no JSON object"));

        // the second prompt carried the feedback
        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].last().unwrap().content.contains("could not be parsed"));
        assert_eq!(engine.gateway().usage().calls, 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let provider = Arc::new(ScriptedProvider::new(["nope"; 3]));
        let engine = engine(provider, 2);
        let mut memory = MemoryStore::new();

        let err = engine
            .decide(PERSONA, &ToolRegistry::new(), &mut memory, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::DecisionParse { attempts: 3, .. }));
        assert_eq!(memory.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_provider_is_retried() {
        let provider = Arc::new(
            ScriptedProvider::new([r#"{"action": "goal_complete", "summary": "ok"}"#])
                .fail_first(AgentError::RateLimited("429".into())),
        );
        let engine = engine(Arc::clone(&provider), 3);
        let mut memory = MemoryStore::new();

        let decision = engine
            .decide(PERSONA, &ToolRegistry::new(), &mut memory, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(decision, Decision::GoalComplete { .. }));
        assert_eq!(provider.prompts().len(), 2);
        // throttled calls leave no decision turn behind
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_prompt_has_framing_then_transcript() {
        let provider = Arc::new(ScriptedProvider::new(Vec::<String>::new()));
        let engine = engine(provider, 0)
            .with_knowledge(Arc::new(StaticKnowledge::new().for_agent("Maurice", "Check MFA first")))
            .with_trim_policy(Arc::new(CompressOldest::new(3)));
        let mut memory = MemoryStore::new();
        memory.append(Turn::goal(goal_prompt("audit IAM")));
        for i in 0..5 {
            memory.append(Turn::observation(format!("note {i}")));
        }

        let messages = engine.build_prompt(PERSONA, &ToolRegistry::new(), &memory);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.starts_with("You are Maurice, a IAM auditor."));
        assert!(messages[0].content.contains("## Knowledge\n\nCheck MFA first"));
        assert!(messages[0].content.contains("No tools available."));
        assert!(messages[0].content.contains(r#""action": "goal_complete""#));
        assert!(messages[1].content.starts_with("Your goal: audit IAM"));
        // trimmed: goal, summary, latest
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3].content, "note 4");
    }
}
