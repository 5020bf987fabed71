//! Agent
//!
//! A named, goal-directed unit: identity, its own memory and action history,
//! the subset of tools it may call, and a shared [`ReasoningEngine`].
//!
//! ```text
//!   idle ──set_goal──▶ working ──goal_complete──▶ complete
//!                        │ ▲
//!                        │ └── use_tool / document / send_message
//!                        └──── fatal error ─────▶ blocked
//!
//!   reset(): any ──▶ idle
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::decision::Decision;
use crate::error::{AgentError, Result};
use crate::gateway::LlmGateway;
use crate::history::{Action, ActionKind, ActionLog};
use crate::memory::{MemoryStore, Turn};
use crate::reasoning::{
    EngineConfig, Persona, ReasoningEngine, goal_prompt, tool_failure_observation,
    tool_success_observation,
};
use crate::tool::{Tool, ToolCall, ToolRegistry};

/// Agent lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Working,
    Complete,
    Blocked,
}

impl AgentStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Blocked)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Working => write!(f, "working"),
            Self::Complete => write!(f, "complete"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Steps allowed in one `run_until_done`
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_steps: 10 }
    }
}

impl AgentConfig {
    pub fn from_env() -> Self {
        Self {
            max_steps: std::env::var("AGENT_MAX_STEPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}

/// A message one agent addressed to another
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub from: String,
    pub to: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// What a single step did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Acted; the goal is still open
    Continue(ActionKind),
    /// The agent declared its goal achieved
    Complete(Completion),
}

/// Final words of a completed goal
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub summary: String,
    pub next_steps: String,
}

/// Result of `run_until_done`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub agent: String,
    pub status: AgentStatus,
    pub steps: usize,
    pub completion: Completion,
}

/// Serializable view of an agent, for monitoring and export
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub name: String,
    pub role: String,
    pub goal: Option<String>,
    pub status: AgentStatus,
    pub tools: Vec<String>,
    pub turns: Vec<Turn>,
    pub actions: Vec<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<Completion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

pub struct Agent {
    name: String,
    role: String,
    engine: Arc<ReasoningEngine>,
    tools: ToolRegistry,
    config: AgentConfig,
    goal: Option<String>,
    status: AgentStatus,
    memory: MemoryStore,
    history: ActionLog,
    outbox: Vec<AgentMessage>,
    inbox: Vec<AgentMessage>,
    completion: Option<Completion>,
    last_error: Option<String>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("status", &self.status)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        engine: Arc<ReasoningEngine>,
        tools: ToolRegistry,
        config: AgentConfig,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            engine,
            tools,
            config,
            goal: None,
            status: AgentStatus::Idle,
            memory: MemoryStore::new(),
            history: ActionLog::new(),
            outbox: Vec::new(),
            inbox: Vec::new(),
            completion: None,
            last_error: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    pub const fn status(&self) -> AgentStatus {
        self.status
    }

    pub const fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub const fn history(&self) -> &ActionLog {
        &self.history
    }

    pub const fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub const fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Messages this agent has sent and nobody has collected yet
    pub fn outbox(&self) -> &[AgentMessage] {
        &self.outbox
    }

    pub fn take_outbox(&mut self) -> Vec<AgentMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Token that cancels the current run between steps
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Start working on `goal`; only allowed from `idle`
    pub fn set_goal(&mut self, goal: impl Into<String>) -> Result<()> {
        let goal = goal.into();
        if goal.trim().is_empty() {
            return Err(AgentError::NoGoal);
        }
        if self.status != AgentStatus::Idle {
            return Err(AgentError::InvalidTransition {
                from: self.status,
                to: AgentStatus::Working,
            });
        }

        tracing::info!(agent = %self.name, %goal, "Goal set");
        self.memory.append(Turn::goal(goal_prompt(&goal)));
        self.goal = Some(goal);
        self.status = AgentStatus::Working;

        for message in std::mem::take(&mut self.inbox) {
            self.memory.append(Turn::observation(inbound_text(&message)));
        }
        Ok(())
    }

    /// Inject an observation (feedback, delivered messages)
    pub fn observe(&mut self, text: impl Into<String>) {
        self.memory.append(Turn::observation(text));
    }

    /// Deliver a message from another agent. It is shown right away while the
    /// agent is working, otherwise when it next gets a goal.
    pub fn deliver(&mut self, message: AgentMessage) {
        if self.status == AgentStatus::Working {
            self.memory.append(Turn::observation(inbound_text(&message)));
        } else {
            self.inbox.push(message);
        }
    }

    /// One reason-act cycle
    pub async fn step(&mut self) -> Result<StepOutcome> {
        if self.goal.is_none() {
            return Err(AgentError::NoGoal);
        }
        if self.status != AgentStatus::Working {
            return Err(AgentError::InvalidTransition {
                from: self.status,
                to: AgentStatus::Working,
            });
        }
        if self.cancel.is_cancelled() {
            return Err(self.block(AgentError::Cancelled));
        }

        let persona = Persona {
            name: &self.name,
            role: &self.role,
        };
        let decided = self
            .engine
            .decide(persona, &self.tools, &mut self.memory, &self.cancel)
            .await;
        match decided {
            Ok(decision) => Ok(self.act(decision).await),
            Err(err) => Err(self.block(err)),
        }
    }

    /// Step until the goal completes, a fatal error occurs or the step limit
    /// is reached
    pub async fn run_until_done(&mut self) -> Result<RunReport> {
        let max_steps = self.config.max_steps;
        let mut steps = 0;

        loop {
            if steps >= max_steps {
                return Err(self.block(AgentError::MaxSteps(max_steps)));
            }
            steps += 1;

            if let StepOutcome::Complete(completion) = self.step().await? {
                tracing::info!(agent = %self.name, steps, "Goal complete");
                return Ok(RunReport {
                    agent: self.name.clone(),
                    status: self.status,
                    steps,
                    completion,
                });
            }
        }
    }

    /// Back to `idle`. Memory, goal and undelivered outbox are cleared; the
    /// action history is kept.
    pub fn reset(&mut self) {
        self.goal = None;
        self.status = AgentStatus::Idle;
        self.memory.reset();
        self.outbox.clear();
        self.completion = None;
        self.last_error = None;
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            name: self.name.clone(),
            role: self.role.clone(),
            goal: self.goal.clone(),
            status: self.status,
            tools: self.tools.names().into_iter().map(String::from).collect(),
            turns: self.memory.snapshot().to_vec(),
            actions: self.history.entries().to_vec(),
            completion: self.completion.clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn block(&mut self, err: AgentError) -> AgentError {
        tracing::warn!(agent = %self.name, error = %err, "Agent blocked");
        self.status = AgentStatus::Blocked;
        self.last_error = Some(err.to_string());
        err
    }

    async fn act(&mut self, decision: Decision) -> StepOutcome {
        match decision {
            Decision::UseTool {
                tool,
                parameters,
                reasoning,
            } => {
                let call = ToolCall::new(&tool, parameters).with_caller(&self.name);
                tracing::debug!(agent = %self.name, %tool, "Dispatching tool");

                match self.tools.dispatch(&call).await {
                    Ok(result) => {
                        self.memory.append(Turn::observation(tool_success_observation(
                            &tool,
                            &result.render(),
                        )));
                        self.history.record(Action::succeeded(
                            ActionKind::ToolCall,
                            format!("Used tool: {tool}"),
                            reasoning,
                            result.value(),
                        ));
                    }
                    Err(err) => {
                        tracing::warn!(agent = %self.name, %tool, error = %err, "Tool call failed");
                        self.memory
                            .append(Turn::observation(tool_failure_observation(&tool, &err)));
                        self.history.record(Action::failed(
                            ActionKind::ToolCall,
                            format!("Tool call failed: {tool}"),
                            reasoning,
                            err.to_string(),
                        ));
                    }
                }
                StepOutcome::Continue(ActionKind::ToolCall)
            }
            Decision::Document { content, reasoning } => {
                self.history.record(Action::succeeded(
                    ActionKind::Document,
                    "Documented findings",
                    reasoning,
                    json!({ "content": content }),
                ));
                self.memory.append(Turn::observation(
                    "Documentation recorded. Continue working toward your goal.",
                ));
                StepOutcome::Continue(ActionKind::Document)
            }
            Decision::SendMessage { to, content } => {
                self.history.record(Action::succeeded(
                    ActionKind::Message,
                    format!("Sent message to {to}"),
                    "",
                    json!({ "to": to, "message": content }),
                ));
                self.memory.append(Turn::observation(format!(
                    "Message to {to} queued for delivery. Continue working toward your goal."
                )));
                self.outbox.push(AgentMessage {
                    from: self.name.clone(),
                    to,
                    content,
                    sent_at: Utc::now(),
                });
                StepOutcome::Continue(ActionKind::Message)
            }
            Decision::GoalComplete {
                summary,
                next_steps,
            } => {
                self.history.record(Action::succeeded(
                    ActionKind::GoalComplete,
                    "Goal completed",
                    "",
                    json!({ "summary": summary, "next_steps": next_steps }),
                ));
                let completion = Completion {
                    summary,
                    next_steps,
                };
                self.completion = Some(completion.clone());
                self.status = AgentStatus::Complete;
                StepOutcome::Complete(completion)
            }
        }
    }
}

fn inbound_text(message: &AgentMessage) -> String {
    format!("Message from {}: {}", message.from, message.content)
}

/// Builder for an [`Agent`]
pub struct AgentBuilder {
    name: String,
    role: String,
    engine: Option<Arc<ReasoningEngine>>,
    gateway: Option<Arc<LlmGateway>>,
    engine_config: EngineConfig,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: "assistant".into(),
            engine: None,
            gateway: None,
            engine_config: EngineConfig::default(),
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Share an existing engine
    #[must_use]
    pub fn engine(mut self, engine: Arc<ReasoningEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Build a private engine over this gateway
    #[must_use]
    pub fn gateway(mut self, gateway: Arc<LlmGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    #[must_use]
    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    /// Register one more tool
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Result<Self> {
        self.tools.register(tool)?;
        Ok(self)
    }

    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub const fn max_steps(mut self, max_steps: usize) -> Self {
        self.config.max_steps = max_steps;
        self
    }

    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let engine = match (self.engine, self.gateway) {
            (Some(engine), _) => engine,
            (None, Some(gateway)) => Arc::new(ReasoningEngine::new(gateway, self.engine_config)),
            (None, None) => {
                return Err(AgentError::Config(format!(
                    "agent '{}' needs an engine or a gateway",
                    self.name
                )));
            }
        };
        if self.name.trim().is_empty() {
            return Err(AgentError::Config("agent name must not be empty".into()));
        }

        Ok(Agent::new(self.name, self.role, engine, self.tools, self.config))
    }
}
