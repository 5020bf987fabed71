//! Error Types

use std::time::Duration;

use thiserror::Error;

use crate::agent::AgentStatus;
use crate::mailbox::TaskId;
use crate::tool::ParameterViolation;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// `step` or `run_until_done` called before a goal was set
    #[error("No goal set; call set_goal() first")]
    NoGoal,

    /// The LLM response could not be parsed into a decision, retries exhausted
    #[error("Decision could not be parsed after {attempts} attempt(s): {reason}")]
    DecisionParse { attempts: usize, reason: String },

    /// Tool parameters failed schema validation
    #[error("Invalid parameters for tool '{tool}': {}", format_violations(.violations))]
    InvalidParameters {
        tool: String,
        violations: Vec<ParameterViolation>,
    },

    /// Tool ran and failed
    #[error("Tool '{tool_name}' failed: {message}")]
    ToolExecution { tool_name: String, message: String },

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// A tool with this name is already registered
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// Only the assignee (or assigner, for reassignment) may mutate a task
    #[error("Agent '{agent}' does not own task {task_id} (owner: {owner})")]
    NotOwner {
        task_id: TaskId,
        agent: String,
        owner: String,
    },

    /// No task with this id exists
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// Task is not in a state that allows the requested change
    #[error("Task {task_id} cannot be changed: {reason}")]
    TaskState { task_id: TaskId, reason: String },

    /// Waiting for a rate limiter permit took too long
    #[error("Timed out after {0:?} waiting for an LLM call permit")]
    RateLimitTimeout(Duration),

    /// The rate limiter was shut down
    #[error("Rate limiter is shut down")]
    LimiterClosed,

    /// The run was cancelled between steps
    #[error("Run cancelled")]
    Cancelled,

    /// A step exceeded its deadline
    #[error("Step exceeded its deadline of {0:?}")]
    StepTimeout(Duration),

    /// Illegal agent status transition
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: AgentStatus, to: AgentStatus },

    /// Maximum steps reached in `run_until_done`
    #[error("Maximum steps ({0}) reached without completing the goal")]
    MaxSteps(usize),

    /// A phase gate kept rejecting the phase outputs
    #[error("Phase '{phase}' rejected after {attempts} attempt(s): {reason}")]
    PhaseRejected {
        phase: String,
        attempts: usize,
        reason: String,
    },

    /// Unknown agent name
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider throttled the request
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Task store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

fn format_violations(violations: &[ParameterViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl AgentError {
    /// Provider-side failures worth another LLM call
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::RateLimited(_) | Self::Io(_)
        )
    }

    /// Failures that are fed back to the agent as an observation instead of
    /// ending the run
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameters { .. } | Self::ToolExecution { .. } | Self::ToolNotFound(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::NoGoal => "The agent has no goal yet.".into(),
            Self::DecisionParse { .. } => {
                "The agent could not produce a usable decision and stopped.".into()
            }
            Self::InvalidParameters { tool, .. } => {
                format!("The tool '{tool}' was called with invalid input.")
            }
            Self::ToolExecution { tool_name, .. } => format!("The tool '{tool_name}' failed."),
            Self::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            Self::NotOwner { .. } => "That task belongs to another agent.".into(),
            Self::TaskNotFound(_) => "Task not found.".into(),
            Self::RateLimitTimeout(_) | Self::RateLimited(_) => {
                "Too many model calls right now. Please wait a moment.".into()
            }
            Self::Cancelled => "The run was cancelled.".into(),
            Self::StepTimeout(_) => "The agent took too long to decide.".into(),
            Self::MaxSteps(_) => {
                "The goal took too many steps. Try a narrower goal.".into()
            }
            Self::PhaseRejected { phase, .. } => {
                format!("Phase '{phase}' was not approved.")
            }
            Self::AgentNotFound(name) => format!("No agent named '{name}'."),
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
