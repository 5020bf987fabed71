//! # agent-core
//!
//! Goal-directed agents on top of a provider-agnostic LLM abstraction: the
//! decision cycle, tool dispatch, memory, the shared call budget and the task
//! mailbox agents use to delegate work to each other.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── Orchestrator ─────────────────────────────┐
//! │  phases ─▶ Agent.run_until_done ─▶ PhaseGate (reviewer / fn / all)    │
//! │                                                                       │
//! │  ┌──────────── Agent ────────────┐        ┌──────── TaskMailbox ────┐ │
//! │  │ MemoryStore   ActionLog       │        │ per-agent queues        │ │
//! │  │ ToolRegistry  outbox / inbox  │◀──────▶│ TaskStore (mem / json)  │ │
//! │  └──────────────┬────────────────┘        └─────────────────────────┘ │
//! │                 ▼                                                     │
//! │        ReasoningEngine (prompt, parse, retry, trim policy)            │
//! │                 ▼                                                     │
//! │        LlmGateway ─ RateLimiter ─ CostMeter ─▶ LlmProvider (Strategy) │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping between Ollama, OpenAI-compatible
//! endpoints or the scripted test provider without changing agent logic.

pub mod agent;
pub mod cost;
pub mod decision;
pub mod error;
pub mod gateway;
pub mod history;
pub mod knowledge;
pub mod limiter;
pub mod mailbox;
pub mod memory;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod reasoning;
pub mod testing;
pub mod tool;

pub use agent::{Agent, AgentBuilder, AgentConfig, AgentSnapshot, AgentStatus, RunReport, StepOutcome};
pub use cost::{CostMeter, CostSummary, ModelPricing, PriceTable};
pub use decision::Decision;
pub use error::{AgentError, Result};
pub use gateway::LlmGateway;
pub use history::{Action, ActionKind, ActionLog};
pub use knowledge::{KnowledgeProvider, StaticKnowledge};
pub use limiter::{RateLimitConfig, RateLimiter};
pub use mailbox::{Priority, Task, TaskId, TaskMailbox, TaskStatus, TaskStore};
pub use memory::{CompressOldest, KeepAll, MemoryStore, TrimPolicy, Turn, TurnRole};
pub use message::{Message, Role};
pub use orchestrator::{
    ApproveAll, FailurePolicy, FnGate, GateVerdict, Orchestrator, OrchestratorConfig, Phase,
    PhaseGate, ReviewerGate,
};
pub use provider::{Completion, GenerationOptions, LlmProvider, TokenUsage};
pub use reasoning::{EngineConfig, ReasoningEngine};
pub use tool::{ParameterSchema, Tool, ToolCall, ToolRegistry, ToolResult, ToolSchema};
