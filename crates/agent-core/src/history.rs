//! Action History
//!
//! The audit trail: one record per acted-on decision. The log only grows;
//! there is no API to edit or remove an entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of action was taken
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ToolCall,
    Document,
    Message,
    GoalComplete,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToolCall => write!(f, "tool_call"),
            Self::Document => write!(f, "document"),
            Self::Message => write!(f, "message"),
            Self::GoalComplete => write!(f, "goal_complete"),
        }
    }
}

/// How the action turned out
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Result(Value),
    Error(String),
}

/// One entry in the audit trail
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub timestamp: DateTime<Utc>,
    pub kind: ActionKind,
    pub description: String,
    pub rationale: String,
    pub outcome: ActionOutcome,
}

impl Action {
    pub fn succeeded(
        kind: ActionKind,
        description: impl Into<String>,
        rationale: impl Into<String>,
        result: Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            description: description.into(),
            rationale: rationale.into(),
            outcome: ActionOutcome::Result(result),
        }
    }

    pub fn failed(
        kind: ActionKind,
        description: impl Into<String>,
        rationale: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            description: description.into(),
            rationale: rationale.into(),
            outcome: ActionOutcome::Error(error.into()),
        }
    }

    pub const fn is_error(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Error(_))
    }
}

/// Append-only action log
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionLog {
    actions: Vec<Action>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, action: Action) {
        tracing::trace!(kind = %action.kind, description = %action.description, "Action recorded");
        self.actions.push(action);
    }

    pub fn entries(&self) -> &[Action] {
        &self.actions
    }

    pub fn last(&self) -> Option<&Action> {
        self.actions.last()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Entries of one kind, in order
    pub fn of_kind(&self, kind: ActionKind) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(move |a| a.kind == kind)
    }
}
